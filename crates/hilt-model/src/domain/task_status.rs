use serde::{Deserialize, Serialize};

/// Execution state of a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Spawned, waiting for a slot.
    Pending,
    /// Holds a slot and runs the test body.
    Running,
    /// Test body returned `Ok`.
    Succeeded,
    /// Test body returned an error or panicked.
    Failed,
    /// Test body exceeded the configured job timeout.
    TimedOut,
    /// Runner cancellation reached the task.
    Canceled,
}

impl TaskStatus {
    /// Returns `true` if the task is in a terminal state (won't transition further).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::TimedOut | TaskStatus::Canceled
        )
    }

    /// Returns `true` if the task is still active (pending or running).
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    /// Short label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timedOut",
            TaskStatus::Canceled => "canceled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::TimedOut.is_terminal());
        assert!(TaskStatus::Canceled.is_terminal());

        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn active_states() {
        assert!(TaskStatus::Pending.is_active());
        assert!(TaskStatus::Running.is_active());

        assert!(!TaskStatus::Succeeded.is_active());
        assert!(!TaskStatus::Canceled.is_active());
    }

    #[test]
    fn serde_name_matches_label() {
        let json = serde_json::to_string(&TaskStatus::TimedOut).unwrap();
        assert_eq!(json, format!("\"{}\"", TaskStatus::TimedOut.as_str()));
    }
}
