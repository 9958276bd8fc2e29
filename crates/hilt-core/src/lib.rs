//! Test orchestration core: module locking, the job runner and the test host.
//!
//! - [`registry`]: one exclusive lock per declared hardware module.
//! - [`coordinator`]: recursive lock/unlock across a module and its dependencies.
//! - [`runner`]: bounded-concurrency dispatch of named test bodies.
//! - [`host`]: owner of the locks, the test bodies, the CLI factory and the report sink.

pub mod error;
pub use error::{CliError, CoreError, LockError, TestError};

pub mod cli;
pub use cli::{Cli, CliFactory, CliOptions};

pub mod coordinator;
pub use coordinator::{Holdings, LockCoordinator, ModuleGuard};

pub mod event;
pub use event::{Bus, Event, EventKind, Subscribe};

pub mod host;
pub use host::{HostBuilder, TestHost};

pub mod registry;
pub use registry::{ModuleLock, ModuleRegistry};

mod report;
pub use report::{MemorySink, ReportSink};

pub mod runner;
pub use runner::{FailurePolicy, JobRunner, RunnerConfig};

pub mod state;
pub use state::TaskState;

pub mod suite;
pub use suite::{Args, TestFn, TestResult, TestSet, test_fn};
