use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;

/// One named test invocation with its positional arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Name of the registered test body.
    pub func: String,
    /// Positional arguments handed to the test body.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

impl JobSpec {
    pub fn new(func: impl Into<String>) -> Self {
        Self {
            func: func.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }
}

/// Ordered list of jobs, as read from a job file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobList(pub Vec<JobSpec>);

impl JobList {
    pub fn from_json_str(s: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn as_slice(&self) -> &[JobSpec] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<JobSpec>> for JobList {
    fn from(jobs: Vec<JobSpec>) -> Self {
        Self(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_job_file_shape() {
        let jobs = JobList::from_json_str(
            r#"[
                {"func": "sleep", "args": [0.5]},
                {"func": "print", "args": ["hello"]},
                {"func": "reset"}
            ]"#,
        )
        .unwrap();

        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs.as_slice()[0], JobSpec::new("sleep").arg(0.5));
        assert_eq!(jobs.as_slice()[1].args[0], Value::from("hello"));
        assert!(jobs.as_slice()[2].args.is_empty());
    }

    #[test]
    fn args_omitted_when_empty() {
        let json = serde_json::to_string(&JobSpec::new("reset")).unwrap();
        assert_eq!(json, r#"{"func":"reset"}"#);
    }
}
