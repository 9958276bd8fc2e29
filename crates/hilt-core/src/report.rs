use std::sync::{Mutex, PoisonError};

use hilt_model::StepRecord;

/// Destination of finished test steps.
///
/// The host forwards to it; `hilt-report` provides the full implementation with CSV and TeX output.
pub trait ReportSink: Send + Sync + 'static {
    fn record(&self, step: StepRecord);

    /// `true` while no recorded step has failed.
    fn global_result(&self) -> bool;
}

/// Sink keeping records in memory. Default sink of a host built without one.
#[derive(Debug, Default)]
pub struct MemorySink {
    steps: Mutex<Vec<StepRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<StepRecord> {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReportSink for MemorySink {
    fn record(&self, step: StepRecord) {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(step);
    }

    fn global_result(&self) -> bool {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .all(|s| s.result != Some(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptive_steps_do_not_fail_the_run() {
        let sink = MemorySink::new();
        assert!(sink.global_result());

        sink.record(StepRecord::new("intro", "POWER", None));
        sink.record(StepRecord::new("boot", "POWER", Some(true)));
        assert!(sink.global_result());

        sink.record(StepRecord::new("reset", "POWER", Some(false)).with_comment("no prompt"));
        assert!(!sink.global_result());
        assert_eq!(sink.steps().len(), 3);
    }
}
