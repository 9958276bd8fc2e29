//! Prometheus metrics for hilt test runs.
//!
//! [`PrometheusMetrics`] is a [`hilt_core::Subscribe`] implementation: register it on the
//! host and it turns runner and coordinator events into Prometheus series.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use hilt_prometheus::{Encoder, PrometheusMetrics, TextEncoder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let subscriber: Arc<dyn hilt_core::Subscribe> = Arc::new(metrics.clone());
//! // TestHost::builder(modules).subscriber(subscriber) ...
//!
//! let families = metrics.gather();
//! let mut buffer = Vec::new();
//! TextEncoder::new().encode(&families, &mut buffer)?;
//! # drop(subscriber);
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `hilt_jobs_dispatched_total{func}` - Counter
//! - `hilt_jobs_skipped_total{func}` - Counter
//! - `hilt_tasks_completed_total{func, outcome}` - Counter
//! - `hilt_tasks_running` - Gauge
//! - `hilt_module_locks_total{module}` - Counter
//!
//! Exposing `/metrics` over HTTP is left to the application.

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
