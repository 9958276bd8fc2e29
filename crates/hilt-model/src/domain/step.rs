use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ModuleName;

/// One finished test step as handed to a report sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub test: String,
    pub module: ModuleName,
    /// `None` marks a descriptive step that does not count toward the global result.
    pub result: Option<bool>,
    #[serde(default)]
    pub comment: String,
    #[serde(with = "secs")]
    pub duration: Duration,
}

impl StepRecord {
    pub fn new(test: impl Into<String>, module: impl Into<String>, result: Option<bool>) -> Self {
        Self {
            test: test.into(),
            module: module.into(),
            result,
            comment: String::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
