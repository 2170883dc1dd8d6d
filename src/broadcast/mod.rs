//! Broadcast service: converts detected events, weather summaries and
//! operator input into ranked, time-boxed messages, keeps a bounded
//! delivery history and fans each dispatched message out to subscribers.
//!
//! The service is an explicitly constructed value. `main` builds one and
//! hands clones of the handle to the pipeline and the HTTP API.

mod history;
mod listeners;
mod queue;
mod scheduler;
mod service;

pub use listeners::{Listener, Subscription};
pub use service::{BroadcastService, BroadcastStats};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::types::{BroadcastMessage, BroadcastPriority, BroadcastTone, BroadcastType};

    pub(crate) fn message(id: &str, priority: BroadcastPriority) -> BroadcastMessage {
        BroadcastMessage {
            id: id.to_string(),
            broadcast_type: BroadcastType::Event,
            priority,
            tone: BroadcastTone::Neutral,
            headline: format!("headline {id}"),
            content: "content".to_string(),
            timestamp: chrono::Utc::now(),
            ttl: 5_000,
            event: None,
            snapshot: None,
            icon: String::new(),
            acknowledged: false,
            has_audio: false,
            tags: Vec::new(),
        }
    }
}
