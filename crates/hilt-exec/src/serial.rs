//! Serial console through `tokio-serial`.
use std::{io, time::Duration};

use async_trait::async_trait;
use hilt_core::{Cli, CliError, CliFactory, CliOptions};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use crate::stream::StreamCli;

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
/// Interrupts whatever the console was running.
const ETX: &str = "\u{3}";
const SETTLE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct SerialFactory {
    port: String,
    baud_rate: u32,
}

impl SerialFactory {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub async fn connect(&self, options: &CliOptions) -> Result<StreamCli<SerialStream>, CliError> {
        debug!(port = %self.port, baud = self.baud_rate, "opening serial port");
        let stream = tokio_serial::new(&self.port, self.baud_rate)
            .timeout(options.timeout)
            .open_native_async()
            .map_err(io::Error::from)?;

        // The console echoes input, so commands are not written to the transcript twice.
        let mut cli = StreamCli::new(stream, options)?.without_command_echo();
        cli.send(ETX, false).await?;
        tokio::time::sleep(SETTLE).await;
        cli.get_ref()
            .clear(ClearBuffer::All)
            .map_err(io::Error::from)?;

        info!(port = %self.port, "serial console ready");
        Ok(cli)
    }
}

#[async_trait]
impl CliFactory for SerialFactory {
    fn name(&self) -> &'static str {
        "serial"
    }

    async fn open(&self, options: CliOptions) -> Result<Box<dyn Cli>, CliError> {
        Ok(Box::new(self.connect(&options).await?))
    }
}
