use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::{FuncName, TaskId, TaskStatus};

/// Snapshot of one dispatched task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    /// Unique task identifier.
    pub id: TaskId,
    /// Test body the task invokes.
    pub func: FuncName,
    /// Current execution state.
    pub status: TaskStatus,
    /// When the task was dispatched.
    #[serde(with = "time_serde")]
    pub created_at: SystemTime,
    /// When the task last changed state.
    #[serde(with = "time_serde")]
    pub updated_at: SystemTime,
    /// Failure text (if status is Failed/TimedOut/Canceled).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

mod time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        (since_epoch.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}
