//! Engine server lifecycle management.
//!
//! Starts `fabric --serve` on demand, captures its output into a bounded
//! tail for diagnostics, detects unexpected exits, and enforces a
//! grace-period-then-kill shutdown.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

/// Most recent output lines kept for diagnostics.
pub const TAIL_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("engine server is already running")]
    AlreadyRunning,
    #[error("engine executable `{command}` not found")]
    ExecutableNotFound { command: String },
    #[error("engine exited during startup; recent output:\n{tail}")]
    ImmediateExit { tail: String },
    #[error("failed to launch engine: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Engine command name or path, resolved against PATH when bare.
    pub command: String,
    /// Port passed to the engine's serve mode.
    pub serve_port: u16,
    /// How long to wait before checking for an immediate exit.
    pub settle: Duration,
    /// Default grace period before a stop escalates to a kill.
    pub stop_grace: Duration,
}

impl SupervisorConfig {
    pub fn new(command: impl Into<String>, serve_port: u16) -> Self {
        Self {
            command: command.into(),
            serve_port,
            settle: Duration::from_secs(2),
            stop_grace: Duration::from_secs(5),
        }
    }
}

/// The running subprocess plus the shared tail buffer its reader
/// threads append to.
struct ProcessHandle {
    child: Child,
    tail: Arc<Mutex<VecDeque<String>>>,
}

/// Owns the engine server subprocess. All methods are called from the
/// control thread; only the internal reader threads touch the tail
/// buffer concurrently, and `tail()` hands out snapshots.
pub struct EngineSupervisor {
    config: SupervisorConfig,
    state: SupervisorState,
    handle: Option<ProcessHandle>,
}

impl EngineSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            state: SupervisorState::Stopped,
            handle: None,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Polls the subprocess. An exit that nobody asked for moves the
    /// supervisor straight back to `Stopped` and clears the handle.
    pub fn is_running(&mut self) -> bool {
        let exited = match &mut self.handle {
            Some(handle) => matches!(handle.child.try_wait(), Ok(Some(_))),
            None => return false,
        };
        if exited {
            warn!("engine server exited unexpectedly");
            self.handle = None;
            self.state = SupervisorState::Stopped;
            return false;
        }
        true
    }

    /// Launches the engine in serve mode and waits a short settle
    /// interval to catch processes that die right away.
    pub fn start(&mut self) -> Result<(), StartError> {
        if self.is_running() {
            return Err(StartError::AlreadyRunning);
        }
        self.state = SupervisorState::Starting;
        let Some(executable) = resolve_executable(&self.config.command) else {
            self.state = SupervisorState::Stopped;
            return Err(StartError::ExecutableNotFound {
                command: self.config.command.clone(),
            });
        };

        let address = format!(":{}", self.config.serve_port);
        info!(executable = %executable.display(), %address, "starting engine server");
        let spawn = Command::new(&executable)
            .arg("--serve")
            .arg("--address")
            .arg(&address)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawn {
            Ok(child) => child,
            Err(err) => {
                self.state = SupervisorState::Stopped;
                return Err(StartError::Spawn(err));
            }
        };

        let tail = Arc::new(Mutex::new(VecDeque::new()));
        if let Some(stdout) = child.stdout.take() {
            spawn_tail_reader(stdout, Arc::clone(&tail));
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_tail_reader(stderr, Arc::clone(&tail));
        }

        thread::sleep(self.config.settle);
        if let Ok(Some(status)) = child.try_wait() {
            self.state = SupervisorState::Stopped;
            let lines: Vec<String> = tail.lock().iter().cloned().collect();
            warn!(%status, "engine server exited during startup");
            return Err(StartError::ImmediateExit {
                tail: lines.join("\n"),
            });
        }

        info!(pid = child.id(), "engine server running");
        self.handle = Some(ProcessHandle { child, tail });
        self.state = SupervisorState::Running;
        Ok(())
    }

    /// Stops the engine, waiting up to `grace` for a clean exit before
    /// killing it. Succeeds silently when nothing is running.
    pub fn stop(&mut self, grace: Duration) {
        let Some(mut handle) = self.handle.take() else {
            self.state = SupervisorState::Stopped;
            return;
        };
        self.state = SupervisorState::Stopping;
        info!("stopping engine server");
        request_graceful_stop(&handle.child);

        let deadline = Instant::now() + grace;
        loop {
            match handle.child.try_wait() {
                Ok(Some(status)) => {
                    info!(%status, "engine server exited");
                    break;
                }
                Ok(None) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(100));
                }
                _ => {
                    warn!("engine server ignored the stop request, killing it");
                    if let Err(err) = handle.child.kill() {
                        warn!(error = %err, "failed to kill engine server");
                    }
                    let _ = handle.child.wait();
                    break;
                }
            }
        }
        self.state = SupervisorState::Stopped;
    }

    /// Stop using the configured default grace period.
    pub fn stop_default(&mut self) {
        self.stop(self.config.stop_grace);
    }

    /// Snapshot of the most recent captured output lines. Never blocks
    /// on the subprocess; empty when nothing is running.
    pub fn tail(&self) -> Vec<String> {
        match &self.handle {
            Some(handle) => handle.tail.lock().iter().cloned().collect(),
            None => Vec::new(),
        }
    }
}

/// Resolve a command name the way a shell would: a path with separators
/// is used as-is, a bare name is searched on PATH. Windows also tries
/// the `.exe` spelling.
fn resolve_executable(command: &str) -> Option<PathBuf> {
    let direct = PathBuf::from(command);
    if direct.components().count() > 1 {
        return direct.is_file().then_some(direct);
    }
    let mut names = vec![command.to_string()];
    if cfg!(windows) && direct.extension().is_none() {
        names.insert(0, format!("{command}.exe"));
    }
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for name in &names {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Reads one output stream line by line, mirroring every line into the
/// application log and into the shared tail buffer.
fn spawn_tail_reader(stream: impl Read + Send + 'static, tail: Arc<Mutex<VecDeque<String>>>) {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if line.is_empty() {
                continue;
            }
            info!(target: "engine::serve", "{line}");
            let mut tail = tail.lock();
            if tail.len() == TAIL_CAPACITY {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    });
}

#[cfg(unix)]
fn request_graceful_stop(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    if let Err(err) = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM) {
        warn!(error = %err, "failed to signal engine server");
    }
}

#[cfg(not(unix))]
fn request_graceful_stop(_child: &Child) {
    // No graceful channel on this platform; stop() escalates to kill
    // once the grace period runs out.
}
