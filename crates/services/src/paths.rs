//! Filesystem locations for persisted state.

use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;

/// The application's config directory and the files inside it. Tests
/// point this at a temp directory; production discovers the platform
/// location once at startup.
#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    /// Platform config directory, created if absent.
    pub fn discover() -> anyhow::Result<Self> {
        let dirs = ProjectDirs::from("com.local", "Fabric Desk", "FabricDesk")
            .context("could not determine a config directory")?;
        let paths = Self::at(dirs.config_dir());
        std::fs::create_dir_all(&paths.config_dir).with_context(|| {
            format!("could not create config dir {}", paths.config_dir.display())
        })?;
        Ok(paths)
    }

    pub fn at(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.config_dir.join("history.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.config_dir.join("fabric-desk.log")
    }
}
