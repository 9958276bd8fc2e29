use std::{io, path::PathBuf, time::Duration};

use hilt_model::ModelError;
use thiserror::Error;

/// Failures of the module lock primitives.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("unknown module: {0}")]
    UnknownModule(String),
    #[error("module {0} released while not held")]
    NotHeld(String),
    #[error("lock of module {0} is closed")]
    Closed(String),
}

/// Host construction failures.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to prepare log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config error: {0}")]
    Config(#[from] ModelError),
}

/// Transport failures reported by [`crate::Cli`] implementations.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("no cli factory configured on the host")]
    NotConfigured,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("timed out after {after:?} waiting for {expected:?}")]
    Timeout { after: Duration, expected: String },
    #[error("connection closed by peer")]
    Closed,
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("non-zero exit code: {code}")]
    NonZeroExit { code: i32 },
    #[error("{0}")]
    Other(String),
}

/// Error returned by a test body.
#[derive(Debug, Error)]
pub enum TestError {
    #[error("check failed: {0}")]
    Check(String),
    #[error("bad argument #{index}: {reason}")]
    BadArgument { index: usize, reason: String },
    #[error("could not lock module {0}")]
    Lock(String),
    #[error("cli: {0}")]
    Cli(#[from] CliError),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl TestError {
    pub fn check(msg: impl Into<String>) -> Self {
        TestError::Check(msg.into())
    }
}
