//! Android devices through the `adb` command-line client.
//!
//! Every command is one `adb shell` invocation, so responses are always read back.
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use hilt_core::{Cli, CliError, CliFactory, CliOptions};
use tracing::{debug, info, warn};

use crate::{
    transcript::Transcript,
    util::{run_captured, run_checked},
};

pub const DEFAULT_PROGRAM: &str = "adb";
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct AdbFactory {
    program: String,
    serial: Option<String>,
    command_timeout: Duration,
}

impl Default for AdbFactory {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            serial: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl AdbFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target one device when several are attached (`adb -s <serial>`).
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Path of the `adb` binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub async fn connect(&self, options: &CliOptions) -> Result<AdbCli, CliError> {
        let cli = AdbCli {
            program: self.program.clone(),
            serial: self.serial.clone(),
            transcript: Transcript::from_options(options)?,
            prompt: options.prompt.clone(),
            timeout: self.command_timeout,
        };
        let state = run_checked(&cli.program, &cli.args(["get-state"]), options.timeout).await?;
        info!(serial = ?self.serial, state = %state.stdout.trim(), "adb device ready");
        Ok(cli)
    }
}

#[async_trait]
impl CliFactory for AdbFactory {
    fn name(&self) -> &'static str {
        "adb"
    }

    async fn open(&self, options: CliOptions) -> Result<Box<dyn Cli>, CliError> {
        Ok(Box::new(self.connect(&options).await?))
    }
}

pub struct AdbCli {
    program: String,
    serial: Option<String>,
    transcript: Transcript,
    prompt: String,
    timeout: Duration,
}

impl AdbCli {
    fn args<'a>(&self, rest: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(serial) = &self.serial {
            args.push("-s".to_string());
            args.push(serial.clone());
        }
        args.extend(rest.into_iter().map(str::to_string));
        args
    }

    /// Restart adbd with root permissions.
    pub async fn set_root(&self) -> Result<(), CliError> {
        run_checked(&self.program, &self.args(["root"]), self.timeout).await?;
        debug!("adb switched to root");
        Ok(())
    }

    /// Copy a local file to the device.
    pub async fn push(&self, local: &Path, remote: &str) -> Result<(), CliError> {
        let local = local.to_string_lossy();
        run_checked(&self.program, &self.args(["push", &*local, remote]), self.timeout).await?;
        Ok(())
    }

    /// Copy a device file to the local filesystem.
    pub async fn pull(&self, remote: &str, local: &Path) -> Result<(), CliError> {
        let local = local.to_string_lossy();
        run_checked(&self.program, &self.args(["pull", remote, &*local]), self.timeout).await?;
        Ok(())
    }
}

#[async_trait]
impl Cli for AdbCli {
    async fn send(&mut self, cmd: &str, readback: bool) -> Result<String, CliError> {
        if !readback {
            warn!("readback is always performed over adb");
        }
        self.transcript.command(&self.prompt, cmd).await?;

        let out = run_captured(&self.program, &self.args(["shell", cmd]), self.timeout).await?;
        let resp = out.stdout.trim().to_string();
        if !out.success() {
            debug!(cmd, code = ?out.code, "adb shell exited with failure");
        }
        self.transcript.append(&format!("{resp}\n")).await?;
        Ok(resp)
    }

    fn switch_file(&mut self, path: PathBuf) {
        self.transcript.switch(path);
    }

    fn store_file(&self) -> &Path {
        self.transcript.path()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Stand-in `adb` printing its arguments.
    fn fake_adb(dir: &Path) -> String {
        let path = dir.join("adb");
        std::fs::write(
            &path,
            "#!/bin/sh\ncase \"$*\" in\n  *get-state*) echo device ;;\n  *) echo \"adb $*\" ;;\nesac\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn shell_commands_target_the_serial() {
        let tmp = tempfile::tempdir().unwrap();
        let store = tmp.path().join("log_cli_android.txt");
        let options = CliOptions::default().with_store_file(&store);

        let factory = AdbFactory::new()
            .with_program(fake_adb(tmp.path()))
            .with_serial("emulator-5554");
        let mut cli = factory.connect(&options).await.unwrap();

        let resp = cli.send("getprop ro.serialno", false).await.unwrap();
        assert_eq!(resp, "adb -s emulator-5554 shell getprop ro.serialno");

        let transcript = std::fs::read_to_string(&store).unwrap();
        assert_eq!(
            transcript,
            "# getprop ro.serialno\nadb -s emulator-5554 shell getprop ro.serialno\n"
        );
    }

    #[tokio::test]
    async fn push_and_pull_run_to_completion() {
        let tmp = tempfile::tempdir().unwrap();
        let options = CliOptions::default().with_store_file(tmp.path().join("t.txt"));
        let cli = AdbFactory::new()
            .with_program(fake_adb(tmp.path()))
            .connect(&options)
            .await
            .unwrap();

        cli.push(Path::new("/tmp/fw.bin"), "/data/fw.bin").await.unwrap();
        cli.pull("/data/log.txt", Path::new("/tmp/log.txt")).await.unwrap();
        cli.set_root().await.unwrap();
    }

    #[tokio::test]
    async fn missing_device_fails_open() {
        let tmp = tempfile::tempdir().unwrap();
        let options = CliOptions::default().with_store_file(tmp.path().join("t.txt"));
        let res = AdbFactory::new()
            .with_program("hilt-no-such-adb")
            .open(options)
            .await;
        assert!(matches!(res, Err(CliError::Spawn(_))));
    }
}
