//! Transport abstraction test bodies use to talk to a device.
//!
//! Concrete transports live in `hilt-exec`; the host only stores a factory and opens
//! fresh channels from it on demand.
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;

use crate::error::CliError;

pub const DEFAULT_PROMPT: &str = "# ";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Options handed to a [`CliFactory`] when opening a channel.
#[derive(Debug, Clone)]
pub struct CliOptions {
    /// Transcript file receiving every command and response.
    ///
    /// Left empty, the host fills in `<log_dir>/<logname>`.
    pub store_file: Option<PathBuf>,
    /// Text that marks the end of a response.
    pub prompt: String,
    /// Upper bound for one command round-trip.
    pub timeout: Duration,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            store_file: None,
            prompt: DEFAULT_PROMPT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl CliOptions {
    pub fn with_store_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_file = Some(path.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An open command channel to a device.
#[async_trait]
pub trait Cli: Send {
    /// Send one command. With `readback` the response up to the prompt is returned,
    /// otherwise an empty string right after the write.
    async fn send(&mut self, cmd: &str, readback: bool) -> Result<String, CliError>;

    /// Redirect the transcript of the following commands.
    fn switch_file(&mut self, path: PathBuf);

    fn store_file(&self) -> &Path;

    async fn close(&mut self) -> Result<(), CliError> {
        Ok(())
    }
}

/// Constructor of [`Cli`] channels together with its connection parameters.
#[async_trait]
pub trait CliFactory: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn open(&self, options: CliOptions) -> Result<Box<dyn Cli>, CliError>;
}
