//! Shared data model for the hilt workspace.
//!
//! Everything here is plain data: module graphs, job descriptors, task records and report rows.
//! Behaviour lives in `hilt-core` and the collaborator crates.

mod error;
pub use error::ModelError;

mod domain;
pub use domain::*;

mod config;
pub use config::{ModuleConfig, ModuleSpec};

mod job;
pub use job::{JobList, JobSpec};
