use hilt_core::{Event, Subscribe};

use crate::subscriber::view::log_event;

/// Logs every runtime event at a level chosen per kind.
#[derive(Debug, Default)]
pub struct Journal;

impl Journal {
    pub fn new() -> Self {
        Self
    }
}

impl Subscribe for Journal {
    fn on_event(&self, event: &Event) {
        log_event(event);
    }

    fn name(&self) -> &'static str {
        "journal"
    }
}
