//! Status event bus
//!
//! Components publish message status changes here; interested consumers
//! (the UI layer, tests) subscribe instead of polling. Lagging or absent
//! subscribers never block a publisher.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use zapflow_common::types::{AccountId, MessageId};
use zapflow_storage::models::MessageStatus;

/// A message status change
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub message_id: MessageId,
    pub account_id: AccountId,
    pub status: MessageStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Broadcast bus for status events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl EventBus {
    /// Create a bus with a bounded backlog per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Dropped silently when nobody is subscribed.
    pub fn publish(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to status events
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
