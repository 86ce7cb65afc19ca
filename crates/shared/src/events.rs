//! Messages that background workers post back to the control thread.
//! Workers never touch display or configuration state directly; these
//! events are the only channel.

/// Terminal outcome of one pattern run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// The engine finished on its own. A non-zero exit code still
    /// counts as completed; the output may be a useful error message.
    Completed { exit_code: Option<i32> },
    /// The user stopped the run. Partial output is kept.
    Cancelled,
    /// The run never produced a verdict: spawn failure, connection
    /// failure, broken stream.
    Failed { reason: String },
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Completed { exit_code: Some(0) })
    }

    /// Short status line for the UI and the history view.
    pub fn label(&self) -> String {
        match self {
            RunStatus::Completed { exit_code: Some(0) } => "Completed".to_string(),
            RunStatus::Completed { exit_code: Some(code) } => {
                format!("Completed (error code {code})")
            }
            RunStatus::Completed { exit_code: None } => "Completed (terminated)".to_string(),
            RunStatus::Cancelled => "Cancelled".to_string(),
            RunStatus::Failed { reason } => format!("Failed: {reason}"),
        }
    }
}

/// Everything a worker can report while the control thread pumps its
/// event queue.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// A display-ready fragment of run output, in stream order.
    OutputFragment(String),
    /// The active run ended; `output` is the accumulated full text.
    RunFinished { status: RunStatus, output: String },
    /// Result of a health probe tick. Repeats every interval even
    /// without a change.
    EngineHealth { online: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        assert_eq!(RunStatus::Completed { exit_code: Some(0) }.label(), "Completed");
        assert_eq!(
            RunStatus::Completed { exit_code: Some(3) }.label(),
            "Completed (error code 3)"
        );
        assert_eq!(RunStatus::Cancelled.label(), "Cancelled");
        assert_eq!(
            RunStatus::Failed { reason: "no route".to_string() }.label(),
            "Failed: no route"
        );
    }

    #[test]
    fn test_only_clean_exit_is_success() {
        assert!(RunStatus::Completed { exit_code: Some(0) }.is_success());
        assert!(!RunStatus::Completed { exit_code: Some(1) }.is_success());
        assert!(!RunStatus::Completed { exit_code: None }.is_success());
        assert!(!RunStatus::Cancelled.is_success());
        assert!(!RunStatus::Failed { reason: String::new() }.is_success());
    }
}
