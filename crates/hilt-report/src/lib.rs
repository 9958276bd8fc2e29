//! Test step bookkeeping and report generation.
//!
//! [`ResultHandler`] collects [`TestStep`]s (and implements the host's
//! [`hilt_core::ReportSink`]); [`ReportTree`] groups them by module and extra fields;
//! the CSV writer and [`Transcriptor`] turn them into files.

mod error;
pub use error::ReportError;

pub mod step;
pub use step::TestStep;

pub mod handler;
pub use handler::ResultHandler;

pub mod tree;
pub use tree::{Node, ReportTree};

pub mod csv;
pub use csv::write_csv;

pub mod tex;
pub use tex::Transcriptor;
