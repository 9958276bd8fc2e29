use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use hilt_core::{Event, EventKind, Subscribe};
use prometheus::{IntCounterVec, IntGauge, Opts, Registry, proto::MetricFamily};

/// Metrics backed by its own [`Registry`]. Clones share the same series.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    dispatched: IntCounterVec,
    skipped: IntCounterVec,
    completed: IntCounterVec,
    running: IntGauge,
    locks: IntCounterVec,
    started: Arc<Mutex<HashSet<String>>>,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Register the series on an existing registry.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let dispatched = IntCounterVec::new(
            Opts::new("hilt_jobs_dispatched_total", "Jobs turned into tasks"),
            &["func"],
        )?;
        let skipped = IntCounterVec::new(
            Opts::new("hilt_jobs_skipped_total", "Jobs naming no registered test"),
            &["func"],
        )?;
        let completed = IntCounterVec::new(
            Opts::new("hilt_tasks_completed_total", "Tasks that reached a final state"),
            &["func", "outcome"],
        )?;
        let running = IntGauge::new("hilt_tasks_running", "Tasks holding a runner slot")?;
        let locks = IntCounterVec::new(
            Opts::new("hilt_module_locks_total", "Module lock acquisitions"),
            &["module"],
        )?;

        registry.register(Box::new(dispatched.clone()))?;
        registry.register(Box::new(skipped.clone()))?;
        registry.register(Box::new(completed.clone()))?;
        registry.register(Box::new(running.clone()))?;
        registry.register(Box::new(locks.clone()))?;

        Ok(Self {
            registry,
            dispatched,
            skipped,
            completed,
            running,
            locks,
            started: Arc::default(),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    fn finish(&self, event: &Event, outcome: &str) {
        let func = event.func.as_deref().unwrap_or("unknown");
        self.completed.with_label_values(&[func, outcome]).inc();

        let Some(task) = &event.task else { return };
        let was_running = self
            .started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task.as_str());
        if was_running {
            self.running.dec();
        }
    }
}

impl Subscribe for PrometheusMetrics {
    fn on_event(&self, event: &Event) {
        let func = event.func.as_deref().unwrap_or("unknown");
        match event.kind {
            EventKind::JobDispatched => self.dispatched.with_label_values(&[func]).inc(),
            EventKind::JobSkipped => self.skipped.with_label_values(&[func]).inc(),
            EventKind::TaskStarting => {
                if let Some(task) = &event.task {
                    self.started
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(task.as_str().to_string());
                }
                self.running.inc();
            }
            EventKind::TaskSucceeded => self.finish(event, "succeeded"),
            EventKind::TaskFailed => self.finish(event, "failed"),
            EventKind::TaskTimedOut => self.finish(event, "timed_out"),
            EventKind::TaskCanceled => self.finish(event, "canceled"),
            EventKind::ModuleLocked => {
                let module = event.module.as_deref().unwrap_or("unknown");
                self.locks.with_label_values(&[module]).inc();
            }
            EventKind::TaskReaped | EventKind::ModuleUnlocked | EventKind::ModuleUnknown => {}
        }
    }

    fn name(&self) -> &'static str {
        "prometheus"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hilt_model::TaskId;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn counts_job_and_task_events() {
        let m = PrometheusMetrics::new().unwrap();
        let id = TaskId::new("print", 1);

        m.on_event(&Event::new(EventKind::JobDispatched).with_task(&id).with_func("print"));
        m.on_event(&Event::new(EventKind::JobSkipped).with_func("nope"));
        m.on_event(&Event::new(EventKind::TaskStarting).with_task(&id).with_func("print"));
        assert_eq!(m.running.get(), 1);

        m.on_event(&Event::new(EventKind::TaskFailed).with_task(&id).with_func("print"));
        assert_eq!(m.running.get(), 0);

        assert_eq!(m.dispatched.with_label_values(&["print"]).get(), 1);
        assert_eq!(m.skipped.with_label_values(&["nope"]).get(), 1);
        assert_eq!(m.completed.with_label_values(&["print", "failed"]).get(), 1);
    }

    #[test]
    fn cancel_before_start_keeps_gauge_at_zero() {
        let m = PrometheusMetrics::new().unwrap();
        let id = TaskId::new("sleep", 4);

        m.on_event(&Event::new(EventKind::TaskCanceled).with_task(&id).with_func("sleep"));
        assert_eq!(m.running.get(), 0);
        assert_eq!(m.completed.with_label_values(&["sleep", "canceled"]).get(), 1);
    }

    #[test]
    fn module_locks_show_up_in_text_exposition() {
        let m = PrometheusMetrics::new().unwrap();
        m.on_event(&Event::new(EventKind::ModuleLocked).with_module("RADIO"));
        m.on_event(&Event::new(EventKind::ModuleLocked).with_module("RADIO"));
        m.on_event(&Event::new(EventKind::ModuleUnlocked).with_module("RADIO"));

        let mut buf = Vec::new();
        TextEncoder::new().encode(&m.gather(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("hilt_module_locks_total{module=\"RADIO\"} 2"));
    }
}
