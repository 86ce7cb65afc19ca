//! Application logging: console output plus a size-rotated log file.
//!
//! Rotation follows the `app.log`, `app.log.1` .. `app.log.N` naming
//! scheme, shifting backups up by one and dropping the oldest when the
//! active file would exceed its size limit.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::paths::AppPaths;

pub const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;
pub const MAX_LOG_BACKUPS: usize = 3;

struct WriterState {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: Option<File>,
    written: u64,
}

impl WriterState {
    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    /// Shift `.1` → `.2` → … → `.N`, drop the old `.N`, move the
    /// active file to `.1`, and start a fresh one.
    fn rotate(&mut self) -> io::Result<()> {
        // Close before renaming; Windows refuses to rename open files.
        self.file = None;
        let _ = fs::remove_file(backup_path(&self.path, self.backups));
        for index in (1..self.backups).rev() {
            let from = backup_path(&self.path, index);
            if from.exists() {
                let _ = fs::rename(&from, backup_path(&self.path, index + 1));
            }
        }
        if self.path.exists() {
            let _ = fs::rename(&self.path, backup_path(&self.path, 1));
        }
        self.written = 0;
        self.reopen()
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.file.is_none() {
            self.reopen()?;
        }
        if self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("log file is not open"))?;
        let n = io::Write::write(file, buf)?;
        self.written += n as u64;
        Ok(n)
    }
}

fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// Size-rotating file writer. Clones share the same underlying file,
/// which is what lets it serve as a `MakeWriter` for the file layer
/// while the app keeps a handle for shutdown.
#[derive(Clone)]
pub struct RotatingWriter {
    state: Arc<Mutex<WriterState>>,
}

impl RotatingWriter {
    pub fn open(path: PathBuf) -> io::Result<Self> {
        Self::with_limits(path, MAX_LOG_BYTES, MAX_LOG_BACKUPS)
    }

    pub fn with_limits(path: PathBuf, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let mut state = WriterState {
            path,
            max_bytes,
            backups: backups.max(1),
            file: None,
            written: 0,
        };
        state.reopen()?;
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Push buffered bytes to disk. Called once at shutdown.
    pub fn flush_all(&self) {
        if let Some(file) = self.state.lock().file.as_mut() {
            let _ = io::Write::flush(file);
            let _ = file.sync_data();
        }
    }
}

impl io::Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.state.lock().file.as_mut() {
            io::Write::flush(file)?;
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Installs the global subscriber: `RUST_LOG`-style filtering (default
/// `info`), human-readable console output, and a plain-text rotating
/// file under the config directory. Returns the file writer so the
/// caller can flush it at exit.
pub fn init(paths: &AppPaths) -> anyhow::Result<RotatingWriter> {
    let writer = RotatingWriter::open(paths.log_file())?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer.clone());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init();
    Ok(writer)
}
