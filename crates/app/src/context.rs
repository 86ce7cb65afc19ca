//! Application state and the event pump.
//!
//! [`AppContext`] owns everything the frontend needs: settings, the run
//! history, the serve-process supervisor, the health monitor, and the
//! transport used for pattern runs. Workers report back over a channel;
//! the owning thread calls [`AppContext::pump`] to fold their events
//! into the state, so all mutation happens on one thread.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use engine::api::{EngineApi, PatternListing};
use engine::health::{self, HealthMonitor};
use engine::models::ModelCatalog;
use engine::supervisor::{EngineSupervisor, StartError, SupervisorConfig};
use engine::transport::{EngineTransport, HttpTransport, StdioTransport, TransportRequest};
use services::{AppPaths, ConfigStore, HistoryStore};
use shared::events::{AppEvent, RunStatus};
use shared::history::HistoryEntry;
use shared::settings::Settings;
use thiserror::Error;
use tracing::{info, warn};

use crate::runner::RequestRunner;

/// Why a submission was refused. Each variant doubles as the message
/// shown to the user.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("a run is already in progress")]
    Busy,
    #[error("the engine server is offline; start it first")]
    EngineOffline,
    #[error("select a pattern first")]
    NoPattern,
    #[error("enter some input text first")]
    EmptyInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportKind {
    Stdio,
    Http,
}

fn build_transport(settings: &Settings, kind: TransportKind) -> Arc<dyn EngineTransport> {
    match kind {
        TransportKind::Stdio => Arc::new(StdioTransport::new(settings.engine_command.clone())),
        TransportKind::Http => Arc::new(HttpTransport::new(settings.base_url.clone())),
    }
}

pub struct AppContext {
    pub settings: Settings,
    config: ConfigStore,
    history: HistoryStore,
    supervisor: EngineSupervisor,
    api: EngineApi,
    transport: Arc<dyn EngineTransport>,
    transport_kind: TransportKind,
    monitor: Option<HealthMonitor>,
    runner: Option<RequestRunner>,
    events_tx: Sender<AppEvent>,
    events_rx: Receiver<AppEvent>,
    /// Streamed output of the active run, or the recalled history entry.
    pub output: String,
    /// Human-readable state of the last or current run.
    pub status_line: String,
    /// Latest health verdict, refreshed by the monitor on every tick.
    pub engine_online: bool,
    last_status: Option<RunStatus>,
}

impl AppContext {
    /// Builds a context from the stores under `paths` without starting
    /// any background work. [`init`](Self::init) is the entry point for
    /// normal use; this one exists so tests control every side effect.
    pub fn init_at(paths: AppPaths) -> Self {
        let config = ConfigStore::new(paths.settings_file());
        let settings = config.load_or_default();
        let history = HistoryStore::load(paths.history_file());
        let supervisor = EngineSupervisor::new(SupervisorConfig::new(
            settings.engine_command.clone(),
            settings.serve_port(),
        ));
        let api = EngineApi::new(settings.base_url.clone());
        let transport_kind = TransportKind::Stdio;
        let transport = build_transport(&settings, transport_kind);
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            settings,
            config,
            history,
            supervisor,
            api,
            transport,
            transport_kind,
            monitor: None,
            runner: None,
            events_tx,
            events_rx,
            output: String::new(),
            status_line: String::new(),
            engine_online: false,
            last_status: None,
        }
    }

    /// Full startup: loads state, spawns the health monitor, and starts
    /// the serve process when settings ask for it.
    pub fn init(paths: AppPaths) -> Self {
        let mut ctx = Self::init_at(paths);
        ctx.start_monitor();
        if ctx.settings.auto_start_server {
            if let Err(err) = ctx.start_engine() {
                warn!(error = %err, "automatic engine start failed");
                ctx.status_line = format!("Engine start failed: {err}");
            }
        }
        ctx
    }

    fn start_monitor(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
        let events = self.events_tx.clone();
        let interval = Duration::from_secs(self.settings.health_check_interval_secs);
        self.monitor = Some(HealthMonitor::spawn(
            self.settings.base_url.clone(),
            interval,
            move |online| {
                let _ = events.send(AppEvent::EngineHealth { online });
            },
        ));
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn last_status(&self) -> Option<&RunStatus> {
        self.last_status.as_ref()
    }

    /// True from a successful [`submit`](Self::submit) until the
    /// matching `RunFinished` event has been pumped. While true, new
    /// submissions and history recall are refused.
    pub fn run_active(&self) -> bool {
        self.runner.is_some()
    }

    /// Starts a pattern run for `input`. Creates the history entry up
    /// front; the run's output is written back to that same entry when
    /// it finishes, however it finishes.
    pub fn submit(&mut self, input: &str) -> Result<(), SubmitError> {
        if self.runner.is_some() {
            return Err(SubmitError::Busy);
        }
        if !self.engine_online {
            return Err(SubmitError::EngineOffline);
        }
        let pattern = self.settings.last_pattern.trim().to_string();
        if pattern.is_empty() {
            return Err(SubmitError::NoPattern);
        }
        if input.trim().is_empty() {
            return Err(SubmitError::EmptyInput);
        }
        let model = match self.settings.last_model.trim() {
            "" => None,
            model => Some(model.to_string()),
        };

        self.history.add(&pattern, input, "");
        self.output.clear();
        self.status_line = "Running".to_string();
        self.last_status = None;

        let request = TransportRequest::new(pattern, model, input);
        info!(
            run = %request.command_preview(&self.settings.engine_command),
            "submitting pattern run"
        );
        self.runner = Some(RequestRunner::spawn(
            Arc::clone(&self.transport),
            request,
            self.events_tx.clone(),
        ));
        Ok(())
    }

    /// Asks the active run to stop. Output produced before the worker
    /// notices is kept and still lands in the history entry.
    pub fn cancel_active(&self) {
        if let Some(runner) = &self.runner {
            info!("cancelling active run");
            runner.cancel();
        }
    }

    /// Drains pending worker events. Call from the owning thread's
    /// repaint or idle loop; never blocks.
    pub fn pump(&mut self) {
        loop {
            match self.events_rx.try_recv() {
                Ok(event) => self.apply_event(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::OutputFragment(fragment) => self.output.push_str(&fragment),
            AppEvent::EngineHealth { online } => self.engine_online = online,
            AppEvent::RunFinished { status, output } => {
                self.history.update_current_output(&output);
                self.status_line = status.label();
                info!(status = %self.status_line, "run finished");
                self.last_status = Some(status);
                if let Some(runner) = self.runner.take() {
                    // The worker sends RunFinished last, so this join
                    // only reclaims an exiting thread.
                    runner.join();
                }
            }
        }
    }

    /// Steps the history cursor to the older neighbour and shows that
    /// entry's output. Refused while a run is active so the finishing
    /// run still writes to the entry it created.
    pub fn history_previous(&mut self) -> Option<&HistoryEntry> {
        if self.runner.is_some() {
            return None;
        }
        let entry = self.history.previous()?;
        self.output = entry.output.clone();
        Some(entry)
    }

    /// Steps the history cursor to the newer neighbour. Same rules as
    /// [`history_previous`](Self::history_previous).
    pub fn history_next(&mut self) -> Option<&HistoryEntry> {
        if self.runner.is_some() {
            return None;
        }
        let entry = self.history.next()?;
        self.output = entry.output.clone();
        Some(entry)
    }

    /// One immediate health probe, outside the monitor's schedule.
    pub fn probe_now(&mut self) -> bool {
        let online = health::probe_once(&self.settings.base_url);
        self.engine_online = online;
        online
    }

    pub fn fetch_patterns(&self) -> PatternListing {
        match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime.block_on(self.api.list_patterns()),
            Err(err) => {
                warn!(error = %err, "failed to build a runtime for the pattern fetch");
                PatternListing::Unreachable
            }
        }
    }

    pub fn fetch_models(&self) -> anyhow::Result<ModelCatalog> {
        ModelCatalog::load(&self.settings.engine_command)
    }

    /// Starts the serve process. The supervisor is rebuilt from the
    /// current settings first unless it is already running, so a start
    /// always uses the latest command and port.
    pub fn start_engine(&mut self) -> Result<(), StartError> {
        if !self.supervisor.is_running() {
            self.supervisor = EngineSupervisor::new(SupervisorConfig::new(
                self.settings.engine_command.clone(),
                self.settings.serve_port(),
            ));
        }
        self.supervisor.start()
    }

    pub fn stop_engine(&mut self) {
        self.supervisor.stop_default();
    }

    pub fn engine_tail(&self) -> Vec<String> {
        self.supervisor.tail()
    }

    /// Routes future runs over the serve process's HTTP API instead of
    /// spawning the CLI per request.
    pub fn use_http_transport(&mut self) {
        self.transport_kind = TransportKind::Http;
        self.transport = build_transport(&self.settings, self.transport_kind);
    }

    /// Saves and adopts new settings. The API client, transport, and
    /// health monitor pick up the change immediately; the supervisor
    /// picks it up at its next start, since a running child keeps the
    /// command line it was launched with.
    pub fn apply_settings(&mut self, mut settings: Settings) {
        settings.normalize();
        if let Err(err) = self.config.save(&settings) {
            warn!(error = %err, "could not save settings");
        }
        self.settings = settings;
        self.api = EngineApi::new(self.settings.base_url.clone());
        self.transport = build_transport(&self.settings, self.transport_kind);
        if self.monitor.is_some() {
            self.start_monitor();
        }
    }

    /// Orderly teardown: ends the active run, stops the monitor, stops
    /// the serve process when settings say so, and saves settings.
    pub fn shutdown(mut self) {
        if let Some(runner) = self.runner.take() {
            if !runner.is_finished() {
                runner.cancel();
            }
            runner.join();
        }
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
        if self.settings.stop_server_on_exit {
            self.supervisor.stop_default();
        }
        if let Err(err) = self.config.save(&self.settings) {
            warn!(error = %err, "could not save settings at exit");
        }
    }
}
