use std::{
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use hilt_core::ReportSink;
use hilt_model::StepRecord;
use tracing::{debug, warn};

use crate::{csv::write_csv, error::ReportError, step::TestStep, tree::ReportTree};

#[derive(Debug)]
struct Inner {
    steps: Vec<TestStep>,
    global: bool,
    index: usize,
    current: Option<TestStep>,
}

/// Thread-safe collection of finished steps.
///
/// Steps get a running index when appended; the global result is the AND of every rated step.
#[derive(Debug)]
pub struct ResultHandler {
    inner: Mutex<Inner>,
}

impl Default for ResultHandler {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                steps: Vec::new(),
                global: true,
                index: 0,
                current: None,
            }),
        }
    }
}

impl ResultHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the handler's current step, replacing any unfinished one.
    pub fn set_step<K, V>(
        &self,
        name: &str,
        module: &str,
        fields: impl IntoIterator<Item = (K, V)>,
    ) where
        K: Into<String>,
        V: Into<String>,
    {
        let mut step = TestStep::new(name, module);
        for (k, v) in fields {
            step.set_field(k, v);
        }
        let mut inner = self.lock();
        if let Some(old) = inner.current.replace(step) {
            warn!(step = old.name(), "unfinished step discarded");
        }
    }

    /// Close the current step and append it.
    pub fn set_result(&self, result: Option<bool>, comments: &str) -> Result<(), ReportError> {
        let mut inner = self.lock();
        let mut step = inner.current.take().ok_or(ReportError::NoPendingStep)?;
        step.set_result(result, comments);
        Self::push(&mut inner, step);
        Ok(())
    }

    /// Append a finished step. Steps without an index get the next one.
    pub fn append_test(&self, step: TestStep) {
        Self::push(&mut self.lock(), step);
    }

    fn push(inner: &mut Inner, mut step: TestStep) {
        inner.index += 1;
        if step.index().is_none() {
            step.set_index(inner.index);
        }
        inner.global &= step.result().unwrap_or(true);
        inner.steps.push(step);
    }

    pub fn global_result(&self) -> bool {
        self.lock().global
    }

    pub fn steps(&self) -> Vec<TestStep> {
        self.lock().steps.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().steps.is_empty()
    }

    pub fn tree(&self) -> ReportTree {
        ReportTree::build(&self.lock().steps)
    }

    /// Write every step as CSV, grouped by hierarchy or in insertion order.
    pub fn write_csv(&self, path: &Path, hierarchy_order: bool) -> Result<(), ReportError> {
        let steps = self.steps();
        write_csv(&steps, path, hierarchy_order)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.tree().to_json()?;
        std::fs::write(path, json).map_err(|e| ReportError::io(path, e))?;
        debug!(path = %path.display(), "json report written");
        Ok(())
    }
}

impl ReportSink for ResultHandler {
    fn record(&self, step: StepRecord) {
        self.append_test(TestStep::from(step));
    }

    fn global_result(&self) -> bool {
        ResultHandler::global_result(self)
    }
}
