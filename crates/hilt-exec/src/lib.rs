//! Command channels to devices under test.
//!
//! Every transport implements [`hilt_core::Cli`] and keeps a transcript file of the
//! commands it sends and the responses it reads. [`AtHandler`] drives modems over a pair of
//! AT-command and response streams.

mod transcript;
pub use transcript::Transcript;

pub mod console;
pub use console::{ConsoleCli, ConsoleFactory};

pub mod stream;
pub use stream::{StreamCli, read_until};

pub mod at;
pub use at::AtHandler;
#[cfg(feature = "serial")]
pub use at::AtPort;

#[cfg(feature = "telnet")]
pub mod telnet;
#[cfg(feature = "telnet")]
pub use telnet::TelnetFactory;

#[cfg(feature = "adb")]
mod util;

#[cfg(feature = "adb")]
pub mod adb;
#[cfg(feature = "adb")]
pub use adb::{AdbCli, AdbFactory};

#[cfg(feature = "serial")]
pub mod serial;
#[cfg(feature = "serial")]
pub use serial::SerialFactory;

pub mod prelude {
    pub use crate::{AtHandler, ConsoleFactory, StreamCli, read_until};
    pub use hilt_core::{Cli, CliError, CliFactory, CliOptions};

    #[cfg(feature = "adb")]
    pub use crate::AdbFactory;
    #[cfg(feature = "serial")]
    pub use crate::SerialFactory;
    #[cfg(feature = "telnet")]
    pub use crate::TelnetFactory;
}
