//! AT-command driver for modems exposing two ports: one taking AT commands, one carrying the
//! application's log output.
use std::time::Duration;

use hilt_core::CliError;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    time::{Instant, timeout_at},
};
use tracing::{debug, error, trace};

use crate::stream::read_until;

/// Final result code of a successful AT command.
pub const OK: &str = "OK";

/// Writes AT commands on one stream and picks filtered lines off a second one.
///
/// Lines on the response stream are only returned when they follow `header_filter`;
/// everything else the application prints is skipped.
pub struct AtHandler<A, R> {
    at: A,
    resp: BufReader<R>,
    header_filter: String,
}

impl<A, R> AtHandler<A, R>
where
    A: AsyncRead + AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    pub fn new(at: A, resp: R, header_filter: impl Into<String>) -> Self {
        Self {
            at,
            resp: BufReader::new(resp),
            header_filter: header_filter.into(),
        }
    }

    pub fn header_filter(&self) -> &str {
        &self.header_filter
    }

    pub fn into_inner(self) -> (A, R) {
        (self.at, self.resp.into_inner())
    }

    /// Send `cmd` terminated by `\r\n`.
    pub async fn write_at(&mut self, cmd: &str) -> Result<(), CliError> {
        debug!(cmd, "w");
        self.at.write_all(format!("{cmd}\r\n").as_bytes()).await?;
        self.at.flush().await?;
        Ok(())
    }

    /// Wait for `expected` on the AT port.
    ///
    /// `timeout` is the longest silence tolerated between two received chunks. A miss is logged
    /// with what was read and returned as `false`.
    pub async fn read_at(&mut self, expected: &str, timeout: Duration) -> Result<bool, CliError> {
        let (found, got) = read_until(&mut self.at, expected, timeout, true).await?;
        if !found {
            error!(expected, got = %got.trim_end(), "read_at: unexpected answer");
        }
        Ok(found)
    }

    /// Send `cmd` and wait for its `OK`.
    pub async fn write_at_ok(&mut self, cmd: &str, timeout: Duration) -> Result<bool, CliError> {
        self.write_at(cmd).await?;
        self.read_at(OK, timeout).await
    }

    /// Next response line following the header filter, trailing whitespace trimmed.
    ///
    /// `timeout` bounds the whole call. Returns `None` when no complete filtered line arrived
    /// in time or the stream ended first.
    pub async fn read_resp(&mut self, timeout: Duration) -> Result<Option<String>, CliError> {
        let deadline = Instant::now() + timeout;
        let mut raw = Vec::new();
        let mut content: Option<Vec<u8>> = None;

        loop {
            let byte = match timeout_at(deadline, self.resp.read_u8()).await {
                Ok(Ok(byte)) => byte,
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break,
            };

            raw.push(byte);
            match content.as_mut() {
                Some(line) if byte == b'\n' => {
                    debug!(raw = %String::from_utf8_lossy(&raw).trim_end(), "r");
                    let line = String::from_utf8_lossy(line);
                    return Ok(Some(line.trim_end().to_string()));
                }
                Some(line) => line.push(byte),
                None => {}
            }
            if content.is_none() && raw.ends_with(self.header_filter.as_bytes()) {
                content = Some(Vec::new());
            }
        }

        trace!(raw = %String::from_utf8_lossy(&raw), "no filtered response");
        Ok(None)
    }

    pub async fn close(&mut self) -> Result<(), CliError> {
        self.at.shutdown().await?;
        Ok(())
    }
}

#[cfg(feature = "serial")]
mod port {
    use std::io;

    use hilt_core::CliError;
    use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
    use tracing::info;

    use super::AtHandler;

    /// One side of an [`AtHandler`]: device path and baud rate.
    #[derive(Debug, Clone)]
    pub struct AtPort {
        pub path: String,
        pub baud_rate: u32,
    }

    impl AtPort {
        pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
            Self {
                path: path.into(),
                baud_rate,
            }
        }

        fn open(&self) -> Result<SerialStream, CliError> {
            let stream = tokio_serial::new(&self.path, self.baud_rate)
                .open_native_async()
                .map_err(io::Error::from)?;
            stream.clear(ClearBuffer::All).map_err(io::Error::from)?;
            Ok(stream)
        }
    }

    impl AtHandler<SerialStream, SerialStream> {
        /// Open both serial ports with empty buffers.
        pub fn open(
            at: &AtPort,
            resp: &AtPort,
            header_filter: impl Into<String>,
        ) -> Result<Self, CliError> {
            let handler = Self::new(at.open()?, resp.open()?, header_filter);
            info!(at = %at.path, resp = %resp.path, "at ports ready");
            Ok(handler)
        }
    }
}
#[cfg(feature = "serial")]
pub use port::AtPort;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn handler() -> (
        AtHandler<tokio::io::DuplexStream, tokio::io::DuplexStream>,
        tokio::io::DuplexStream,
        tokio::io::DuplexStream,
    ) {
        let (at, modem_at) = duplex(256);
        let (resp, modem_resp) = duplex(256);
        (AtHandler::new(at, resp, "[APP] "), modem_at, modem_resp)
    }

    #[tokio::test]
    async fn write_at_terminates_with_crlf() {
        let (mut h, mut modem, _resp) = handler();
        h.write_at("AT+CFUN=1").await.unwrap();

        let mut got = [0u8; 11];
        modem.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"AT+CFUN=1\r\n");
    }

    #[tokio::test]
    async fn write_at_ok_waits_for_ok() {
        let (mut h, mut modem, _resp) = handler();
        tokio::spawn(async move {
            let mut cmd = [0u8; 4];
            let _ = modem.read_exact(&mut cmd).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = modem.write_all(b"\r\nOK\r\n").await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        assert!(h.write_at_ok("AT", Duration::from_millis(500)).await.unwrap());
    }

    #[tokio::test]
    async fn read_at_reports_error_answer() {
        let (mut h, mut modem, _resp) = handler();
        modem.write_all(b"\r\nERROR\r\n").await.unwrap();

        assert!(!h.read_at(OK, Duration::from_millis(50)).await.unwrap());
    }

    #[tokio::test]
    async fn read_resp_returns_line_after_filter() {
        let (mut h, _at, mut app) = handler();
        app.write_all(b"boot noise\r\n[APP] rssi=-71 \r\n[APP] next\n")
            .await
            .unwrap();

        let line = h.read_resp(Duration::from_millis(200)).await.unwrap();
        assert_eq!(line.as_deref(), Some("rssi=-71"));
        let line = h.read_resp(Duration::from_millis(200)).await.unwrap();
        assert_eq!(line.as_deref(), Some("next"));
    }

    #[tokio::test]
    async fn read_resp_gives_up_without_filtered_line() {
        let (mut h, _at, mut app) = handler();
        app.write_all(b"unrelated\n[APP] no newline yet").await.unwrap();

        assert_eq!(h.read_resp(Duration::from_millis(50)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_resp_stops_at_end_of_stream() {
        let (mut h, _at, app) = handler();
        drop(app);

        assert_eq!(h.read_resp(Duration::from_secs(1)).await.unwrap(), None);
    }
}
