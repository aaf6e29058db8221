//! View-model events for whatever renders the session.
//!
//! The core only publishes; it never reads display state back.

use super::aggregate::Aggregate;
use super::entries::CityGroup;
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum SessionEvent {
    /// The entry list changed; carries the fresh grouped view.
    EntriesChanged(Vec<CityGroup>),
    /// The meeting point was replaced (or cleared).
    AggregateChanged(Option<Aggregate>),
    /// A city could not be resolved and its pending entries were dropped.
    ResolutionError { name: String, message: String },
}

pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to all subscribers. Having none is not an error.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}
