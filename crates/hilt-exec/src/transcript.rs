use std::path::{Path, PathBuf};

use hilt_core::{CliError, CliOptions};
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

/// Append-only record of one channel's traffic.
#[derive(Debug, Clone)]
pub struct Transcript {
    path: PathBuf,
}

impl Transcript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Transcript configured in `options`; channels opened without one cannot record.
    pub fn from_options(options: &CliOptions) -> Result<Self, CliError> {
        options
            .store_file
            .clone()
            .map(Self::new)
            .ok_or_else(|| CliError::Other("no transcript file in cli options".into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn switch(&mut self, path: PathBuf) {
        self.path = path;
    }

    pub async fn append(&self, text: &str) -> Result<(), CliError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Record a command line the way a shell would echo it.
    pub async fn command(&self, prompt: &str, cmd: &str) -> Result<(), CliError> {
        self.append(&format!("{prompt}{cmd}\n")).await
    }
}
