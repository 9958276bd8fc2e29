//! Telnet login shell over plain TCP. Option negotiation is not performed.
use std::time::Duration;

use async_trait::async_trait;
use hilt_core::{Cli, CliError, CliFactory, CliOptions};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::stream::StreamCli;

pub const DEFAULT_PORT: u16 = 23;
pub const DEFAULT_USER: &str = "root";
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const LOGIN_PROMPT: &str = "login: ";

#[derive(Debug, Clone)]
pub struct TelnetFactory {
    addr: String,
    user: String,
    connect_timeout: Duration,
}

impl TelnetFactory {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            addr: format!("{}:{port}", host.into()),
            user: DEFAULT_USER.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl CliFactory for TelnetFactory {
    fn name(&self) -> &'static str {
        "telnet"
    }

    async fn open(&self, options: CliOptions) -> Result<Box<dyn Cli>, CliError> {
        debug!(addr = %self.addr, "connecting");
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| CliError::Timeout {
                after: self.connect_timeout,
                expected: format!("connection to {}", self.addr),
            })??;
        stream.set_nodelay(true)?;

        let mut cli = StreamCli::new(stream, &options)?;
        cli.expect(LOGIN_PROMPT, options.timeout).await?;
        cli.send(&self.user, true).await?;
        info!(addr = %self.addr, user = %self.user, "telnet session open");
        Ok(Box::new(cli))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::TcpListener,
    };

    async fn fake_device(listener: TcpListener) {
        let (sock, _) = listener.accept().await.unwrap();
        let (rd, mut wr) = sock.into_split();
        wr.write_all(b"device login: ").await.unwrap();
        let mut lines = BufReader::new(rd).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let reply = match line.as_str() {
                "root" => "welcome\n# ".to_string(),
                other => format!("{other}: done\n# "),
            };
            if wr.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn logs_in_then_runs_commands() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(fake_device(listener));

        let tmp = tempfile::tempdir().unwrap();
        let store = tmp.path().join("log_cli_modem.txt");
        let options = CliOptions::default()
            .with_store_file(&store)
            .with_timeout(Duration::from_secs(2));

        let mut cli = TelnetFactory::new("127.0.0.1", port).open(options).await.unwrap();
        let resp = cli.send("uptime", true).await.unwrap();
        assert_eq!(resp, "uptime: done\n# ");

        let transcript = std::fs::read_to_string(&store).unwrap();
        assert!(transcript.starts_with("# root\nwelcome\n# "));
        assert!(transcript.ends_with("# uptime\nuptime: done\n# "));
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let tmp = tempfile::tempdir().unwrap();
        let options = CliOptions::default().with_store_file(tmp.path().join("t.txt"));
        let res = TelnetFactory::new("127.0.0.1", port)
            .with_connect_timeout(Duration::from_secs(2))
            .open(options)
            .await;
        assert!(res.is_err());
    }
}
