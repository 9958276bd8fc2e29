use std::borrow::Borrow;

use hilt_core::{Event, EventKind};
use tracing::{debug, error, info, trace, warn};

pub trait View {
    fn as_task(&self) -> &str;
    fn as_func(&self) -> &str;
    fn as_module(&self) -> &str;
    fn as_reason(&self) -> &str;
    fn kind(&self) -> EventKind;
}

impl<T> View for T
where
    T: Borrow<Event>,
{
    #[inline]
    fn as_task(&self) -> &str {
        self.borrow().task.as_ref().map_or("unknown", |t| t.as_str())
    }
    #[inline]
    fn as_func(&self) -> &str {
        self.borrow().func.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn as_module(&self) -> &str {
        self.borrow().module.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn as_reason(&self) -> &str {
        self.borrow().reason.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn kind(&self) -> EventKind {
        self.borrow().kind
    }
}

#[inline]
pub fn message_for(kind: EventKind) -> &'static str {
    match kind {
        // runner
        EventKind::JobDispatched => "job dispatched",
        EventKind::JobSkipped => "job skipped; no test registered under this name",
        EventKind::TaskStarting => "task acquired a slot and is starting",
        EventKind::TaskSucceeded => "task finished successfully",
        EventKind::TaskFailed => "task failed",
        EventKind::TaskTimedOut => "task exceeded its configured timeout",
        EventKind::TaskCanceled => "task canceled",
        EventKind::TaskReaped => "task reaped",

        // coordinator
        EventKind::ModuleLocked => "module locked",
        EventKind::ModuleUnlocked => "module unlocked",
        EventKind::ModuleUnknown => "module is not declared in the configuration",
    }
}

#[inline]
pub fn log_event<E: View>(e: E) {
    let msg = message_for(e.kind());

    match e.kind() {
        // runner
        EventKind::JobDispatched => trace!(task = e.as_task(), func = e.as_func(), "{msg}"),
        EventKind::JobSkipped => warn!(func = e.as_func(), "{msg}"),
        EventKind::TaskStarting => info!(task = e.as_task(), "{msg}"),
        EventKind::TaskSucceeded => debug!(task = e.as_task(), "{msg}"),
        EventKind::TaskFailed => {
            error!(task = e.as_task(), reason = e.as_reason(), "{msg}")
        }
        EventKind::TaskTimedOut => {
            warn!(task = e.as_task(), reason = e.as_reason(), "{msg}")
        }
        EventKind::TaskCanceled => info!(task = e.as_task(), "{msg}"),
        EventKind::TaskReaped => trace!(task = e.as_task(), "{msg}"),

        // coordinator
        EventKind::ModuleLocked => debug!(module = e.as_module(), "{msg}"),
        EventKind::ModuleUnlocked => debug!(module = e.as_module(), "{msg}"),
        EventKind::ModuleUnknown => warn!(module = e.as_module(), "{msg}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hilt_model::TaskId;

    #[test]
    fn view_falls_back_to_unknown() {
        let e = Event::new(EventKind::ModuleLocked).with_module("RADIO");
        assert_eq!(e.as_module(), "RADIO");
        assert_eq!(e.as_task(), "unknown");

        let id = TaskId::new("print", 3);
        let e = Event::new(EventKind::TaskFailed).with_task(&id).with_reason("boom");
        assert_eq!((&e).as_task(), "print#3");
        assert_eq!(e.as_reason(), "boom");
    }
}
