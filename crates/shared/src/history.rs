//! The record of one past transformation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One past request: what ran, on what input, and what came back.
///
/// Immutable after creation except `output`, which the store overwrites
/// once when the originating request finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub pattern: String,
    pub input: String,
    pub output: String,
}

impl HistoryEntry {
    pub fn new(pattern: &str, input: &str, output: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            pattern: pattern.to_string(),
            input: input.to_string(),
            output: output.to_string(),
        }
    }
}
