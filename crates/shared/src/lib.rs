pub mod events;
pub mod history;

pub mod settings {
    use serde::{Deserialize, Serialize};
    use url::Url;

    /// Where the engine's serve process listens unless configured otherwise.
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8083";

    fn default_true() -> bool {
        true
    }

    fn default_base_url() -> String {
        DEFAULT_BASE_URL.to_string()
    }

    fn default_geometry() -> String {
        "900x600".to_string()
    }

    fn default_health_interval() -> u64 {
        5
    }

    fn default_engine_command() -> String {
        "fabric".to_string()
    }

    /// Persisted application settings.
    ///
    /// Unknown keys in the settings file are ignored; missing keys fall
    /// back to these defaults, so older files keep loading.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Settings {
        /// Root of the engine server's HTTP surface, no trailing slash.
        #[serde(default = "default_base_url")]
        pub base_url: String,
        /// Pattern selected in the last session.
        #[serde(default)]
        pub last_pattern: String,
        /// Model selected in the last session, empty for the engine default.
        #[serde(default)]
        pub last_model: String,
        /// Main window size, kept for the widget layer.
        #[serde(default = "default_geometry")]
        pub window_geometry: String,
        /// Start the engine server when the app launches.
        #[serde(default)]
        pub auto_start_server: bool,
        /// Stop the engine server when the app exits.
        #[serde(default = "default_true")]
        pub stop_server_on_exit: bool,
        /// Seconds between health probes.
        #[serde(default = "default_health_interval")]
        pub health_check_interval_secs: u64,
        /// Engine binary: a bare name resolved on PATH, or a full path.
        #[serde(default = "default_engine_command")]
        pub engine_command: String,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                base_url: default_base_url(),
                last_pattern: String::new(),
                last_model: String::new(),
                window_geometry: default_geometry(),
                auto_start_server: false,
                stop_server_on_exit: true,
                health_check_interval_secs: default_health_interval(),
                engine_command: default_engine_command(),
            }
        }
    }

    impl Settings {
        /// Tidy up values that arrive from a hand-edited file: the base
        /// URL loses trailing slashes and an empty one falls back to the
        /// default, as does an empty engine command.
        pub fn normalize(&mut self) {
            let trimmed = self.base_url.trim().trim_end_matches('/');
            self.base_url = if trimmed.is_empty() {
                default_base_url()
            } else {
                trimmed.to_string()
            };
            if self.engine_command.trim().is_empty() {
                self.engine_command = default_engine_command();
            }
        }

        /// Port the serve process should bind: the base URL's explicit
        /// port, else the scheme default.
        pub fn serve_port(&self) -> u16 {
            match Url::parse(&self.base_url) {
                Ok(url) => url.port_or_known_default().unwrap_or(80),
                Err(_) => 8083,
            }
        }
    }

}
