//! Delivery status tracker
//!
//! Consumes asynchronous delivery acknowledgements from the transport and
//! advances each message through its lifecycle. Transitions are forward
//! only; a stale or duplicate acknowledgement can never regress a message.
//! Events for the same message are serialized through a per-message lock;
//! independent messages update independently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zapflow_common::types::{DeliveryEvent, DeliveryState, MessageId};
use zapflow_storage::models::MessageStatus;
use zapflow_storage::repository::ScheduledMessageRepository;

use super::OutreachError;
use crate::events::{EventBus, StatusEvent};

/// Position of a status along the delivery lifecycle
fn delivery_rank(status: MessageStatus) -> Option<u8> {
    match status {
        MessageStatus::Sent => Some(1),
        MessageStatus::Delivered => Some(2),
        MessageStatus::Read => Some(3),
        _ => None,
    }
}

/// Delivery status tracker
pub struct DeliveryTracker {
    messages: ScheduledMessageRepository,
    events: EventBus,
    locks: Mutex<HashMap<MessageId, Arc<Mutex<()>>>>,
}

impl DeliveryTracker {
    /// Create a new delivery tracker
    pub fn new(pool: sqlx::SqlitePool, events: EventBus) -> Self {
        Self {
            messages: ScheduledMessageRepository::new(pool),
            events,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Consume delivery events until the channel closes or shutdown fires
    pub async fn run(&self, mut rx: mpsc::Receiver<DeliveryEvent>, shutdown: CancellationToken) {
        info!("Delivery tracker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Delivery tracker stopped");
                    break;
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        info!("Delivery event channel closed");
                        break;
                    };
                    if let Err(e) = self.handle_event(&event).await {
                        warn!(
                            provider_id = %event.provider_message_id,
                            "Failed to record delivery event: {}", e
                        );
                    }
                }
            }
        }
    }

    async fn lock_for(&self, id: MessageId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id).or_default().clone()
    }

    async fn release_lock(&self, id: MessageId) {
        let mut locks = self.locks.lock().await;
        locks.remove(&id);
    }

    /// Record one delivery acknowledgement
    pub async fn handle_event(&self, event: &DeliveryEvent) -> Result<(), OutreachError> {
        let Some(found) = self
            .messages
            .get_by_provider_id(&event.provider_message_id)
            .await?
        else {
            // The ack may belong to a conversation this store never tracked
            warn!(
                provider_id = %event.provider_message_id,
                state = %event.state,
                "Dropping delivery event for unknown provider id"
            );
            return Ok(());
        };

        let lock = self.lock_for(found.id).await;
        let _guard = lock.lock().await;

        // Re-read under the lock so concurrent acks see each other's writes
        let Some(message) = self.messages.get(found.id).await? else {
            return Ok(());
        };

        let Some(current) = message.status_enum() else {
            warn!(message = %message.id, status = %message.status, "Unparseable status");
            return Ok(());
        };

        let Some(current_rank) = delivery_rank(current) else {
            // Terminal or pre-send rows take no further acknowledgements
            debug!(
                message = %message.id,
                status = %message.status,
                "Ignoring delivery event outside the sent lifecycle"
            );
            return Ok(());
        };

        let applied = match event.state {
            DeliveryState::Failed => {
                if current == MessageStatus::Read {
                    debug!(message = %message.id, "Failure ack after read, ignored");
                    false
                } else {
                    self.messages
                        .apply_delivery_transition(
                            message.id,
                            current,
                            MessageStatus::Failed,
                            event.timestamp,
                            Some("provider reported delivery failure"),
                        )
                        .await?
                }
            }
            DeliveryState::Sent | DeliveryState::Delivered | DeliveryState::Read => {
                let target = match event.state {
                    DeliveryState::Sent => MessageStatus::Sent,
                    DeliveryState::Delivered => MessageStatus::Delivered,
                    _ => MessageStatus::Read,
                };
                let target_rank = delivery_rank(target).unwrap_or(0);

                if target_rank <= current_rank {
                    debug!(
                        message = %message.id,
                        current = %current,
                        incoming = %event.state,
                        "Out-of-order delivery event ignored"
                    );
                    false
                } else {
                    self.messages
                        .apply_delivery_transition(
                            message.id,
                            current,
                            target,
                            event.timestamp,
                            None,
                        )
                        .await?
                }
            }
        };

        if applied {
            let status = match event.state {
                DeliveryState::Sent => MessageStatus::Sent,
                DeliveryState::Delivered => MessageStatus::Delivered,
                DeliveryState::Read => MessageStatus::Read,
                DeliveryState::Failed => MessageStatus::Failed,
            };
            self.events.publish(StatusEvent {
                message_id: message.id,
                account_id: message.account_id.clone(),
                status,
                occurred_at: event.timestamp,
            });

            if status.is_terminal() {
                drop(_guard);
                self.release_lock(message.id).await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use zapflow_storage::models::CreateScheduledMessage;
    use zapflow_storage::DatabasePool;

    struct Harness {
        tracker: DeliveryTracker,
        messages: ScheduledMessageRepository,
    }

    async fn harness() -> Harness {
        let db = DatabasePool::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let pool = db.pool().clone();
        Harness {
            tracker: DeliveryTracker::new(pool.clone(), EventBus::default()),
            messages: ScheduledMessageRepository::new(pool),
        }
    }

    /// Create a message and walk it to sent with a provider id
    async fn sent_message(h: &Harness, provider_id: &str) -> MessageId {
        let created = h
            .messages
            .create(CreateScheduledMessage {
                account_id: "main".to_string(),
                contact_id: None,
                recipient_name: None,
                recipient_surname: None,
                recipient_phone: "111".to_string(),
                recipient_email: None,
                recipient_birthday: None,
                body: "hi".to_string(),
                images: None,
                extra_vars: None,
                scheduled_at: Some(Utc::now()),
                status: MessageStatus::Scheduled,
                message_number: None,
                trigger_key: None,
                follow_up_delay_secs: None,
            })
            .await
            .unwrap();

        h.messages.claim_sending(created.id).await.unwrap();
        h.messages.mark_sent(created.id, provider_id).await.unwrap();
        created.id
    }

    fn event(provider_id: &str, state: DeliveryState) -> DeliveryEvent {
        DeliveryEvent {
            provider_message_id: provider_id.to_string(),
            state,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_read_can_skip_delivered_and_never_regresses() {
        let h = harness().await;
        let id = sent_message(&h, "wamid.1").await;

        // Read arrives without a delivered ack: forward, accepted
        h.tracker
            .handle_event(&event("wamid.1", DeliveryState::Read))
            .await
            .unwrap();
        let row = h.messages.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, "read");

        // A late delivered ack must not regress the message
        h.tracker
            .handle_event(&event("wamid.1", DeliveryState::Delivered))
            .await
            .unwrap();
        let row = h.messages.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, "read");

        let history = h.messages.history(id).await.unwrap();
        let statuses: Vec<_> = history.iter().map(|e| e.status.as_str()).collect();
        assert_eq!(statuses, vec!["scheduled", "sending", "sent", "read"]);
    }

    #[tokio::test]
    async fn test_happy_path_sent_delivered_read() {
        let h = harness().await;
        let id = sent_message(&h, "wamid.2").await;

        h.tracker
            .handle_event(&event("wamid.2", DeliveryState::Delivered))
            .await
            .unwrap();
        h.tracker
            .handle_event(&event("wamid.2", DeliveryState::Read))
            .await
            .unwrap();

        let history = h.messages.history(id).await.unwrap();
        let statuses: Vec<_> = history.iter().map(|e| e.status.as_str()).collect();
        assert_eq!(
            statuses,
            vec!["scheduled", "sending", "sent", "delivered", "read"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_ack_is_ignored() {
        let h = harness().await;
        let id = sent_message(&h, "wamid.3").await;

        h.tracker
            .handle_event(&event("wamid.3", DeliveryState::Delivered))
            .await
            .unwrap();
        h.tracker
            .handle_event(&event("wamid.3", DeliveryState::Delivered))
            .await
            .unwrap();

        let history = h.messages.history(id).await.unwrap();
        assert_eq!(history.len(), 4); // scheduled, sending, sent, delivered
    }

    #[tokio::test]
    async fn test_unknown_provider_id_dropped() {
        let h = harness().await;
        sent_message(&h, "wamid.4").await;

        // No error, nothing changes
        h.tracker
            .handle_event(&event("wamid.unknown", DeliveryState::Read))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_provider_failure_after_sent() {
        let h = harness().await;
        let id = sent_message(&h, "wamid.5").await;

        h.tracker
            .handle_event(&event("wamid.5", DeliveryState::Failed))
            .await
            .unwrap();

        let row = h.messages.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, "failed");

        let history = h.messages.history(id).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.status, "failed");
        assert_eq!(
            last.note.as_deref(),
            Some("provider reported delivery failure")
        );
    }

    #[tokio::test]
    async fn test_failure_after_read_ignored() {
        let h = harness().await;
        let id = sent_message(&h, "wamid.6").await;

        h.tracker
            .handle_event(&event("wamid.6", DeliveryState::Read))
            .await
            .unwrap();
        h.tracker
            .handle_event(&event("wamid.6", DeliveryState::Failed))
            .await
            .unwrap();

        let row = h.messages.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, "read");
    }
}
