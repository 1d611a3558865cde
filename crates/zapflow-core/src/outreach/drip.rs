//! Drip rule engine
//!
//! Turns qualifying trigger events (new sale records ingested from outside)
//! into a paired two-message sequence. Materialization is keyed by the
//! trigger identifier: re-processing the same trigger writes nothing. The
//! configured delays and message content are frozen onto the pair at
//! materialization; later settings edits only affect future triggers.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info};
use zapflow_common::types::{MessageId, PhoneNumber};
use zapflow_storage::models::{CreateScheduledMessage, DripTrigger, MessageStatus};
use zapflow_storage::repository::{DripRepository, ScheduledMessageRepository};

use super::OutreachError;

/// A sale record ingested from the external feed
#[derive(Debug, Clone, Deserialize)]
pub struct SaleEvent {
    /// External document number; doubles as the idempotency key
    pub document: String,
    pub customer_name: Option<String>,
    pub phone: String,
    pub amount: Option<f64>,
    /// When the sale happened; defaults to ingestion time
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Drip rule engine
pub struct DripEngine {
    drip: DripRepository,
    messages: ScheduledMessageRepository,
}

impl DripEngine {
    /// Create a new drip engine
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self {
            drip: DripRepository::new(pool.clone()),
            messages: ScheduledMessageRepository::new(pool),
        }
    }

    /// Materialize the message pair for one trigger event.
    ///
    /// Returns the new pair's ids, or `None` when drip is disabled or the
    /// trigger was already processed.
    pub async fn process_trigger(
        &self,
        sale: SaleEvent,
    ) -> Result<Option<(MessageId, MessageId)>, OutreachError> {
        let settings = self.drip.get_or_default().await?;

        if !settings.enabled {
            debug!(document = %sale.document, "Drip disabled, trigger ignored");
            return Ok(None);
        }

        if settings.account_id.is_empty() {
            return Err(OutreachError::Validation(
                "drip sending account not configured".to_string(),
            ));
        }

        if sale.document.trim().is_empty() {
            return Err(OutreachError::Validation(
                "sale document identifier is required".to_string(),
            ));
        }

        let phone = PhoneNumber::normalize(&sale.phone).ok_or_else(|| {
            OutreachError::Validation("sale record has no usable phone number".to_string())
        })?;

        let now = Utc::now();
        let trigger_time = sale.occurred_at.unwrap_or(now);
        let first_not_before = trigger_time + Duration::seconds(settings.first_delay_secs());

        // A trigger that arrives after its delay already elapsed goes
        // straight to the eligible state
        let first_status = if first_not_before <= now {
            MessageStatus::Scheduled
        } else {
            MessageStatus::PendingFirstMessage
        };

        let extra_vars = serde_json::json!({
            "document": sale.document,
            "amount": sale.amount,
        });

        let trigger = DripTrigger {
            trigger_key: sale.document.clone(),
            customer_name: sale.customer_name.clone(),
            phone: phone.as_str().to_string(),
            document: Some(sale.document.clone()),
            amount: sale.amount,
            triggered_at: trigger_time,
            processed_at: now,
        };

        let first = CreateScheduledMessage {
            account_id: settings.account_id.clone(),
            contact_id: None,
            recipient_name: sale.customer_name.clone(),
            recipient_surname: None,
            recipient_phone: phone.as_str().to_string(),
            recipient_email: None,
            recipient_birthday: None,
            body: settings.first_body.clone(),
            images: Some(settings.first_images_vec()),
            extra_vars: Some(extra_vars.clone()),
            scheduled_at: Some(first_not_before),
            status: first_status,
            message_number: Some(1),
            trigger_key: Some(sale.document.clone()),
            follow_up_delay_secs: None,
        };

        let second = CreateScheduledMessage {
            account_id: settings.account_id.clone(),
            contact_id: None,
            recipient_name: sale.customer_name,
            recipient_surname: None,
            recipient_phone: phone.into_string(),
            recipient_email: None,
            recipient_birthday: None,
            body: settings.second_body.clone(),
            images: Some(settings.second_images_vec()),
            extra_vars: Some(extra_vars),
            // Pinned until the first message reaches sent
            scheduled_at: None,
            status: MessageStatus::ScheduledFuture,
            message_number: Some(2),
            trigger_key: Some(sale.document),
            follow_up_delay_secs: Some(settings.second_delay_secs()),
        };

        match self.messages.create_drip_pair(&trigger, first, second).await? {
            Some((first_id, second_id)) => {
                info!(
                    trigger = %trigger.trigger_key,
                    first = %first_id,
                    second = %second_id,
                    "Drip pair materialized"
                );
                Ok(Some((first_id, second_id)))
            }
            None => {
                info!(trigger = %trigger.trigger_key, "Trigger already materialized, skipped");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapflow_storage::models::UpdateDripSettings;
    use zapflow_storage::DatabasePool;

    struct Harness {
        engine: DripEngine,
        drip: DripRepository,
        messages: ScheduledMessageRepository,
    }

    async fn harness() -> Harness {
        let db = DatabasePool::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let pool = db.pool().clone();
        let harness = Harness {
            engine: DripEngine::new(pool.clone()),
            drip: DripRepository::new(pool.clone()),
            messages: ScheduledMessageRepository::new(pool),
        };

        harness
            .drip
            .update(UpdateDripSettings {
                enabled: Some(true),
                account_id: Some("main".to_string()),
                first_delay_value: Some(1),
                first_delay_unit: Some("hours".to_string()),
                second_delay_value: Some(7),
                second_delay_unit: Some("days".to_string()),
                first_body: Some("Gracias {name}! Compra {document}".to_string()),
                second_body: Some("Como va todo, {name}?".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        harness
    }

    fn sale(document: &str) -> SaleEvent {
        SaleEvent {
            document: document.to_string(),
            customer_name: Some("Maria".to_string()),
            phone: "+54 911 5555-0001".to_string(),
            amount: Some(120.5),
            occurred_at: None,
        }
    }

    #[tokio::test]
    async fn test_materializes_pair_with_frozen_delays() {
        let h = harness().await;

        let (first_id, second_id) = h
            .engine
            .process_trigger(sale("A-0001"))
            .await
            .unwrap()
            .unwrap();

        let first = h.messages.get(first_id).await.unwrap().unwrap();
        assert_eq!(first.status, "pending_first_message");
        assert_eq!(first.message_number, Some(1));
        assert_eq!(first.recipient_phone, "5491155550001");
        assert!(first.scheduled_at.is_some());

        let second = h.messages.get(second_id).await.unwrap().unwrap();
        assert_eq!(second.status, "scheduled_future");
        assert_eq!(second.message_number, Some(2));
        assert!(second.scheduled_at.is_none());
        assert_eq!(second.follow_up_delay_secs, Some(7 * 86400));

        // Settings changes after materialization leave the pair untouched
        h.drip
            .update(UpdateDripSettings {
                second_delay_value: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        let second = h.messages.get(second_id).await.unwrap().unwrap();
        assert_eq!(second.follow_up_delay_secs, Some(7 * 86400));
    }

    #[tokio::test]
    async fn test_same_trigger_processed_once() {
        let h = harness().await;

        assert!(h.engine.process_trigger(sale("A-0002")).await.unwrap().is_some());
        assert!(h.engine.process_trigger(sale("A-0002")).await.unwrap().is_none());

        assert_eq!(h.messages.count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_elapsed_delay_schedules_immediately() {
        let h = harness().await;

        let mut event = sale("A-0003");
        // Sale from two days ago: the one-hour delay has long elapsed
        event.occurred_at = Some(Utc::now() - Duration::days(2));

        let (first_id, _) = h.engine.process_trigger(event).await.unwrap().unwrap();
        let first = h.messages.get(first_id).await.unwrap().unwrap();
        assert_eq!(first.status, "scheduled");
    }

    #[tokio::test]
    async fn test_disabled_rule_ignores_trigger() {
        let h = harness().await;
        h.drip
            .update(UpdateDripSettings {
                enabled: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(h.engine.process_trigger(sale("A-0004")).await.unwrap().is_none());
        assert_eq!(h.messages.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_phone_rejected() {
        let h = harness().await;
        let mut event = sale("A-0005");
        event.phone = "n/a".to_string();

        let err = h.engine.process_trigger(event).await.unwrap_err();
        assert!(matches!(err, OutreachError::Validation(_)));
    }
}
