//! Outbound redaction hook
//!
//! Events leave the process through the live feeds. When `public_mode` is on,
//! every outbound event passes through a [`Redactor`] exactly once, right
//! before it is published. Stored session state is never redacted.

use crate::types::{Event, FeedMessage};
use std::sync::Arc;

/// Stateless rewrite of an event's text fields.
pub trait Redactor: Send + Sync {
    fn redact(&self, event: &Event) -> Event;
}

/// Identity redactor
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRedaction;

impl Redactor for NoRedaction {
    fn redact(&self, event: &Event) -> Event {
        event.clone()
    }
}

/// Shared handle used by watcher tasks
pub type SharedRedactor = Arc<dyn Redactor>;

/// Redact every event a feed message carries
pub fn redact_message(redactor: &dyn Redactor, message: FeedMessage) -> FeedMessage {
    match message {
        FeedMessage::Full { reason, mut session } => {
            session.events = session.events.iter().map(|e| redactor.redact(e)).collect();
            FeedMessage::Full { reason, session }
        }
        FeedMessage::Delta(mut delta) => {
            delta.events = delta.events.iter().map(|e| redactor.redact(e)).collect();
            FeedMessage::Delta(delta)
        }
    }
}
