//! Dummy transport: commands go to stdout and the transcript, nothing comes back.
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hilt_core::{Cli, CliError, CliFactory, CliOptions};
use tokio::io::{AsyncWriteExt, Stdout, stdout};
use tracing::{trace, warn};

use crate::transcript::Transcript;

pub struct ConsoleCli {
    out: Stdout,
    transcript: Transcript,
    prompt: String,
}

impl ConsoleCli {
    pub fn new(options: &CliOptions) -> Result<Self, CliError> {
        Ok(Self {
            out: stdout(),
            transcript: Transcript::from_options(options)?,
            prompt: options.prompt.clone(),
        })
    }
}

#[async_trait]
impl Cli for ConsoleCli {
    async fn send(&mut self, cmd: &str, readback: bool) -> Result<String, CliError> {
        trace!(cmd, "console send");
        self.transcript.command(&self.prompt, cmd).await?;
        self.out.write_all(format!("{cmd}\n").as_bytes()).await?;
        self.out.flush().await?;
        if readback {
            warn!("console transport has no response to read back");
        }
        Ok(String::new())
    }

    fn switch_file(&mut self, path: PathBuf) {
        self.transcript.switch(path);
    }

    fn store_file(&self) -> &Path {
        self.transcript.path()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleFactory;

#[async_trait]
impl CliFactory for ConsoleFactory {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn open(&self, options: CliOptions) -> Result<Box<dyn Cli>, CliError> {
        Ok(Box::new(ConsoleCli::new(&options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_commands_only() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("first.txt");
        let second = tmp.path().join("second.txt");
        let options = CliOptions::default().with_store_file(&first);

        let mut cli = ConsoleFactory.open(options).await.unwrap();
        assert_eq!(cli.send("ls /", true).await.unwrap(), "");
        cli.switch_file(second.clone());
        cli.send("reboot", false).await.unwrap();

        assert_eq!(std::fs::read_to_string(&first).unwrap(), "# ls /\n");
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "# reboot\n");
        assert_eq!(cli.store_file(), second.as_path());
    }
}
