//! Command channel over any byte stream: TCP sockets, serial ports, in-memory pipes.
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use hilt_core::{Cli, CliError, CliOptions};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::{Instant, timeout_at},
};
use tracing::{debug, trace};

use crate::transcript::Transcript;

const CHUNK: usize = 256;

#[derive(Debug, PartialEq, Eq)]
enum ReadEnd {
    Found,
    TimedOut,
    Eof,
}

async fn read_until_end<R>(
    reader: &mut R,
    expected: &str,
    timeout: Duration,
    inactivity: bool,
) -> io::Result<(ReadEnd, String)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut raw = Vec::new();
    let mut buf = [0u8; CHUNK];
    let mut deadline = Instant::now() + timeout;

    loop {
        let n = match timeout_at(deadline, reader.read(&mut buf)).await {
            Ok(read) => read?,
            Err(_) => return Ok((ReadEnd::TimedOut, String::from_utf8_lossy(&raw).into_owned())),
        };
        if n == 0 {
            return Ok((ReadEnd::Eof, String::from_utf8_lossy(&raw).into_owned()));
        }
        raw.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&raw);
        if text.contains(expected) {
            return Ok((ReadEnd::Found, text.into_owned()));
        }
        if inactivity {
            deadline = Instant::now() + timeout;
        }
    }
}

/// Read from `reader` until `expected` shows up.
///
/// Returns whether it was found and everything read so far. `timeout` bounds the whole call,
/// or, with `inactivity`, the silence between two received chunks. End of stream stops the
/// read with `found == false`.
pub async fn read_until<R>(
    reader: &mut R,
    expected: &str,
    timeout: Duration,
    inactivity: bool,
) -> io::Result<(bool, String)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let (end, text) = read_until_end(reader, expected, timeout, inactivity).await?;
    Ok((end == ReadEnd::Found, text))
}

/// Shell-like channel: writes `cmd\n` and reads the response up to the prompt.
pub struct StreamCli<S> {
    stream: S,
    transcript: Transcript,
    prompt: String,
    timeout: Duration,
    echo_commands: bool,
}

impl<S> StreamCli<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, options: &CliOptions) -> Result<Self, CliError> {
        Ok(Self {
            stream,
            transcript: Transcript::from_options(options)?,
            prompt: options.prompt.clone(),
            timeout: options.timeout,
            echo_commands: true,
        })
    }

    /// Stop writing `<prompt><cmd>` lines to the transcript; for devices that echo input back.
    pub fn without_command_echo(mut self) -> Self {
        self.echo_commands = false;
        self
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Wait for `expected` on the stream without sending anything.
    pub async fn expect(&mut self, expected: &str, timeout: Duration) -> Result<String, CliError> {
        let (end, text) = read_until_end(&mut self.stream, expected, timeout, false).await?;
        match end {
            ReadEnd::Found => Ok(text),
            ReadEnd::TimedOut => Err(CliError::Timeout {
                after: timeout,
                expected: expected.to_string(),
            }),
            ReadEnd::Eof => Err(CliError::Closed),
        }
    }
}

#[async_trait]
impl<S> Cli for StreamCli<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, cmd: &str, readback: bool) -> Result<String, CliError> {
        if self.echo_commands {
            self.transcript.command(&self.prompt, cmd).await?;
        }
        trace!(cmd, "stream send");
        self.stream.write_all(format!("{cmd}\n").as_bytes()).await?;
        self.stream.flush().await?;
        if !readback {
            return Ok(String::new());
        }

        let (end, resp) = read_until_end(&mut self.stream, &self.prompt, self.timeout, false).await?;
        self.transcript.append(&resp).await?;
        match end {
            ReadEnd::Found => Ok(resp),
            ReadEnd::TimedOut => {
                debug!(cmd, partial = %resp, "no prompt before timeout");
                Err(CliError::Timeout {
                    after: self.timeout,
                    expected: self.prompt.clone(),
                })
            }
            ReadEnd::Eof => Err(CliError::Closed),
        }
    }

    fn switch_file(&mut self, path: PathBuf) {
        self.transcript.switch(path);
    }

    fn store_file(&self) -> &Path {
        self.transcript.path()
    }

    async fn close(&mut self) -> Result<(), CliError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader, duplex};

    #[tokio::test]
    async fn read_until_stops_at_expected() {
        let (mut near, mut far) = duplex(64);
        far.write_all(b"boot ok\nlogin: ").await.unwrap();

        let (found, text) = read_until(&mut near, "login: ", Duration::from_secs(1), false)
            .await
            .unwrap();
        assert!(found);
        assert_eq!(text, "boot ok\nlogin: ");
    }

    #[tokio::test]
    async fn read_until_returns_partial_text_on_timeout() {
        let (mut near, mut far) = duplex(64);
        far.write_all(b"partial").await.unwrap();

        let (found, text) = read_until(&mut near, "# ", Duration::from_millis(50), false)
            .await
            .unwrap();
        assert!(!found);
        assert_eq!(text, "partial");
    }

    #[tokio::test]
    async fn inactivity_timeout_restarts_on_each_chunk() {
        async fn trickle(mut far: tokio::io::DuplexStream) {
            for _ in 0..6 {
                tokio::time::sleep(Duration::from_millis(25)).await;
                let _ = far.write_all(b".").await;
            }
            let _ = far.write_all(b"OK").await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        let (mut near, far) = duplex(64);
        tokio::spawn(trickle(far));
        let (found, _) = read_until(&mut near, "OK", Duration::from_millis(100), true)
            .await
            .unwrap();
        assert!(found);

        let (mut near, far) = duplex(64);
        tokio::spawn(trickle(far));
        let (found, text) = read_until(&mut near, "OK", Duration::from_millis(100), false)
            .await
            .unwrap();
        assert!(!found);
        assert!(!text.contains("OK"));
    }

    #[tokio::test]
    async fn send_reads_back_to_prompt_and_records() {
        let tmp = tempfile::tempdir().unwrap();
        let store = tmp.path().join("log_cli_radio.txt");
        let (near, far) = duplex(256);

        tokio::spawn(async move {
            let (rd, mut wr) = tokio::io::split(far);
            let mut lines = BufReader::new(rd).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                wr.write_all(format!("{line}\nok\n# ").as_bytes()).await.unwrap();
            }
        });

        let options = CliOptions::default().with_store_file(&store);
        let mut cli = StreamCli::new(near, &options).unwrap();
        let resp = cli.send("echo hi", true).await.unwrap();

        assert_eq!(resp, "echo hi\nok\n# ");
        let transcript = std::fs::read_to_string(&store).unwrap();
        assert_eq!(transcript, "# echo hi\necho hi\nok\n# ");
    }

    #[tokio::test]
    async fn send_without_readback_returns_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let options = CliOptions::default().with_store_file(tmp.path().join("t.txt"));
        let (near, mut far) = duplex(64);

        let mut cli = StreamCli::new(near, &options).unwrap().without_command_echo();
        assert_eq!(cli.send("\u{3}", false).await.unwrap(), "");

        let mut got = [0u8; 2];
        far.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"\x03\n");
    }

    #[tokio::test]
    async fn closed_peer_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let options = CliOptions::default().with_store_file(tmp.path().join("t.txt"));
        let (near, far) = duplex(64);

        let mut cli = StreamCli::new(near, &options).unwrap();
        drop(far);
        let err = cli.send("ls", true).await.unwrap_err();
        assert!(matches!(err, CliError::Closed | CliError::Io(_)));
    }

    #[tokio::test]
    async fn timeout_names_the_prompt() {
        let tmp = tempfile::tempdir().unwrap();
        let options = CliOptions::default()
            .with_store_file(tmp.path().join("t.txt"))
            .with_timeout(Duration::from_millis(30));
        let (near, _far) = duplex(64);

        let mut cli = StreamCli::new(near, &options).unwrap();
        match cli.send("ls", true).await {
            Err(CliError::Timeout { expected, .. }) => assert_eq!(expected, "# "),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
