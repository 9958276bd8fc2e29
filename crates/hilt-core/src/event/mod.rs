use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    time::SystemTime,
};

use hilt_model::TaskId;
use tracing::warn;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // runner
    JobDispatched,
    JobSkipped,
    TaskStarting,
    TaskSucceeded,
    TaskFailed,
    TaskTimedOut,
    TaskCanceled,
    TaskReaped,

    // coordinator
    ModuleLocked,
    ModuleUnlocked,
    ModuleUnknown,
}

/// Runtime notification published by the runner and the lock coordinator.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub at: SystemTime,
    pub task: Option<TaskId>,
    pub func: Option<String>,
    pub module: Option<String>,
    pub reason: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            at: SystemTime::now(),
            task: None,
            func: None,
            module: None,
            reason: None,
        }
    }

    pub fn with_task(mut self, task: &TaskId) -> Self {
        self.task = Some(task.clone());
        self
    }

    pub fn with_func(mut self, func: impl Into<String>) -> Self {
        self.func = Some(func.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Receiver of runtime events.
///
/// Called inline on the publishing task, so implementations must not block.
pub trait Subscribe: Send + Sync + 'static {
    fn on_event(&self, event: &Event);

    fn name(&self) -> &'static str;
}

/// Fan-out of events to every registered subscriber.
#[derive(Clone, Default)]
pub struct Bus {
    subscribers: Arc<Vec<Arc<dyn Subscribe>>>,
}

impl Bus {
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        Self {
            subscribers: Arc::new(subscribers),
        }
    }

    pub fn publish(&self, event: Event) {
        for sub in self.subscribers.iter() {
            if catch_unwind(AssertUnwindSafe(|| sub.on_event(&event))).is_err() {
                warn!(subscriber = sub.name(), kind = ?event.kind, "subscriber panicked while processing an event");
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.subscribers.iter().map(|s| s.name()).collect();
        f.debug_struct("Bus").field("subscribers", &names).finish()
    }
}
