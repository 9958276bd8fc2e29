use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Identifier of one dispatched task.
///
/// The runner derives it from the job's func name and a per-runner sequence number,
/// e.g. `print_sleep#4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Arc<str>);

impl TaskId {
    pub fn new(func: &str, seq: u64) -> Self {
        Self(Arc::from(format!("{func}#{seq}")))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_joins_func_and_sequence() {
        let id = TaskId::new("sleep", 3);
        assert_eq!(id.as_str(), "sleep#3");
        assert_eq!(id.to_string(), "sleep#3");
        assert_eq!(id, TaskId::from("sleep#3"));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = TaskId::new("print", 1);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""print#1""#);
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
