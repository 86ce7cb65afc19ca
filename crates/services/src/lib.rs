//! Durable state and diagnostics: where files live, settings and
//! history persistence, and the rotating application log.

pub mod config;
pub mod history;
pub mod logging;
pub mod paths;

pub use config::ConfigStore;
pub use history::HistoryStore;
pub use paths::AppPaths;
