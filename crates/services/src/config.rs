//! Settings persistence. A missing or corrupt file falls back to
//! defaults so startup never fails on bad state; saves rewrite the
//! whole file.

use std::path::PathBuf;

use anyhow::Context;
use shared::settings::Settings;
use tracing::warn;

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads and normalizes settings. Unknown keys are ignored, absent
    /// keys get defaults, and a file that does not parse at all is
    /// treated like no file.
    pub fn load_or_default(&self) -> Settings {
        let mut settings = match std::fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str::<Settings>(&text) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "settings file malformed, using defaults");
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        };
        settings.normalize();
        settings
    }

    pub fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(settings).context("could not encode settings")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("could not write {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("settings.json"))
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = store_in(&dir).load_or_default();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("settings.json"), "{oops").unwrap();
        let settings = store_in(&dir).load_or_default();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let settings = Settings {
            base_url: "http://localhost:9999".to_string(),
            last_pattern: "summarize".to_string(),
            auto_start_server: true,
            ..Settings::default()
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load_or_default(), settings);
    }

    #[test]
    fn test_load_normalizes_base_url() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"base_url":"http://localhost:8083/"}"#,
        )
        .unwrap();
        assert_eq!(store.load_or_default().base_url, "http://localhost:8083");
    }
}
