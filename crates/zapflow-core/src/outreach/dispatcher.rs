//! Dispatch loop
//!
//! A recurring tick that, per connected account, claims the single oldest
//! eligible message and hands it to the transport. Claims are
//! compare-and-swap status updates, so two overlapping ticks can never
//! select the same row. One message in flight per account, a minimum
//! interval between sends, and the working-hour window are all enforced
//! here. Failures never kill the loop; they are recorded on the message
//! and the loop moves on.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};
use zapflow_storage::models::{MessageStatus, ScheduledMessage};
use zapflow_storage::repository::{ScheduledMessageRepository, SenderSettingsRepository};

use super::engine::within_working_hours;
use super::template;
use super::OutreachError;
use crate::events::{EventBus, StatusEvent};
use crate::ticker::Ticker;
use crate::transport::{ConnectionRegistry, Transport};

/// Dispatch loop
pub struct Dispatcher {
    messages: ScheduledMessageRepository,
    settings: SenderSettingsRepository,
    registry: Arc<ConnectionRegistry>,
    events: EventBus,
    /// Interval between polling ticks
    tick_period: Duration,
    /// Upper bound on one transport send; timeout counts as failed
    send_timeout: Duration,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(pool: SqlitePool, registry: Arc<ConnectionRegistry>, events: EventBus) -> Self {
        Self {
            messages: ScheduledMessageRepository::new(pool.clone()),
            settings: SenderSettingsRepository::new(pool),
            registry,
            events,
            tick_period: Duration::from_secs(5),
            send_timeout: Duration::from_secs(30),
        }
    }

    /// Set the tick period
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Set the send timeout
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Start the periodic loop; the returned ticker cancels it
    pub fn start(self: Arc<Self>) -> Ticker {
        let period = self.tick_period;
        info!(period_secs = period.as_secs(), "Dispatch loop started");
        Ticker::spawn("dispatch", period, move || {
            let dispatcher = Arc::clone(&self);
            async move {
                if let Err(e) = dispatcher.tick().await {
                    error!("Dispatch tick failed: {}", e);
                }
            }
        })
    }

    /// Run one dispatch tick over every connected account
    pub async fn tick(&self) -> anyhow::Result<()> {
        let now = Utc::now();

        // Drip first messages whose trigger delay elapsed become eligible
        let promoted = self.messages.promote_due_pending(now).await?;
        if promoted > 0 {
            debug!(promoted, "Promoted due drip messages");
        }

        for account_id in self.registry.connected_accounts().await {
            if let Err(e) = self.process_account(&account_id).await {
                // The loop survives per-account failures
                error!(account = %account_id, "Account dispatch failed: {}", e);
            }
        }

        Ok(())
    }

    /// Dispatch at most one message for one account
    async fn process_account(&self, account_id: &str) -> Result<(), OutreachError> {
        let now = Utc::now();
        let settings = self.settings.get_or_default(account_id).await?;

        if !settings.enabled {
            return Ok(());
        }

        if !within_working_hours(&settings, now) {
            return Ok(());
        }

        // At most one in-flight send per account
        if self.messages.count_sending(account_id).await? > 0 {
            debug!(account = %account_id, "Send already in flight, skipping");
            return Ok(());
        }

        // Minimum interval between sends, measured from the store so the
        // throttle holds across restarts
        if let Some(last_sent) = self.messages.last_sent_at(account_id).await? {
            let elapsed = now.signed_duration_since(last_sent).num_seconds();
            if elapsed < settings.send_interval_secs {
                debug!(
                    account = %account_id,
                    elapsed,
                    interval = settings.send_interval_secs,
                    "Send interval not elapsed, skipping"
                );
                return Ok(());
            }
        }

        let Some(candidate) = self.messages.next_ready(account_id, now).await? else {
            return Ok(());
        };

        let Some(transport) = self.registry.get(account_id).await else {
            // Account disconnected between listing and dispatch; the
            // message simply stays scheduled
            return Ok(());
        };

        if !self.messages.claim_sending(candidate.id).await? {
            // Another tick claimed it first
            return Ok(());
        }

        self.events.publish(StatusEvent {
            message_id: candidate.id,
            account_id: account_id.to_string(),
            status: MessageStatus::Sending,
            occurred_at: Utc::now(),
        });

        self.send_claimed(&candidate, &settings.timezone, transport)
            .await
    }

    /// Resolve content and push one claimed message through the transport
    async fn send_claimed(
        &self,
        message: &ScheduledMessage,
        timezone: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<(), OutreachError> {
        let tz: Tz = timezone.parse().unwrap_or(chrono_tz::UTC);
        let body = template::render(message, Utc::now().with_timezone(&tz));
        let images = message.images_vec();

        let send = transport.send_message(&message.recipient_phone, &body, &images);

        match tokio::time::timeout(self.send_timeout, send).await {
            Ok(Ok(provider_id)) => {
                info!(
                    message = %message.id,
                    provider_id = %provider_id,
                    "Message sent"
                );
                let sent = self.messages.mark_sent(message.id, &provider_id).await?;

                self.events.publish(StatusEvent {
                    message_id: message.id,
                    account_id: message.account_id.clone(),
                    status: MessageStatus::Sent,
                    occurred_at: Utc::now(),
                });

                // A sent drip first message releases its pinned sibling
                if message.message_number == Some(1) {
                    if let (Some(trigger_key), Some(sent_at)) = (
                        message.trigger_key.as_deref(),
                        sent.as_ref().and_then(|m| m.sent_at),
                    ) {
                        if let Some(follow_up) = self
                            .messages
                            .promote_follow_up(trigger_key, sent_at)
                            .await?
                        {
                            info!(
                                message = %follow_up.id,
                                not_before = ?follow_up.scheduled_at,
                                "Drip follow-up released"
                            );
                        }
                    }
                }

                Ok(())
            }
            Ok(Err(e)) => {
                warn!(message = %message.id, "Send failed: {}", e);
                self.messages.mark_failed(message.id, &e.to_string()).await?;
                self.events.publish(StatusEvent {
                    message_id: message.id,
                    account_id: message.account_id.clone(),
                    status: MessageStatus::Failed,
                    occurred_at: Utc::now(),
                });
                Ok(())
            }
            Err(_) => {
                warn!(message = %message.id, "Send timed out");
                self.messages
                    .mark_failed(message.id, "transport send timed out")
                    .await?;
                self.events.publish(StatusEvent {
                    message_id: message.id,
                    account_id: message.account_id.clone(),
                    status: MessageStatus::Failed,
                    occurred_at: Utc::now(),
                });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;
    use zapflow_storage::models::{
        CreateScheduledMessage, DripTrigger, ImageAttachment, UpdateSenderSettings,
    };
    use zapflow_storage::DatabasePool;

    use crate::transport::TransportError;

    struct MockTransport {
        connected: AtomicBool,
        fail_sends: bool,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                connected: AtomicBool::new(true),
                fail_sends: false,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail_sends: true,
                ..Self::new()
            }
        }

        async fn sent_count(&self) -> usize {
            self.sent.lock().await.len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn send_message(
            &self,
            phone: &str,
            text: &str,
            _images: &[ImageAttachment],
        ) -> Result<String, TransportError> {
            if self.fail_sends {
                return Err(TransportError::Rejected("provider said no".to_string()));
            }
            let mut sent = self.sent.lock().await;
            sent.push((phone.to_string(), text.to_string()));
            Ok(format!("wamid.{}", sent.len()))
        }
    }

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        messages: ScheduledMessageRepository,
        settings: SenderSettingsRepository,
        transport: Arc<MockTransport>,
    }

    async fn harness(transport: MockTransport) -> Harness {
        let db = DatabasePool::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let pool = db.pool().clone();

        let registry = Arc::new(ConnectionRegistry::new());
        let transport = Arc::new(transport);
        registry
            .register("main".to_string(), transport.clone())
            .await;

        let settings = SenderSettingsRepository::new(pool.clone());
        // Window open around the clock so tests are wall-clock independent
        settings
            .update(
                "main",
                UpdateSenderSettings {
                    work_start: Some("00:00".to_string()),
                    work_end: Some("23:59".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let dispatcher = Arc::new(Dispatcher::new(
            pool.clone(),
            registry,
            EventBus::default(),
        ));

        Harness {
            dispatcher,
            messages: ScheduledMessageRepository::new(pool.clone()),
            settings,
            transport,
        }
    }

    fn message(account: &str) -> CreateScheduledMessage {
        CreateScheduledMessage {
            account_id: account.to_string(),
            contact_id: None,
            recipient_name: Some("Maria".to_string()),
            recipient_surname: None,
            recipient_phone: "5491155550001".to_string(),
            recipient_email: None,
            recipient_birthday: None,
            body: "Hola {name}".to_string(),
            images: None,
            extra_vars: None,
            scheduled_at: Some(Utc::now() - chrono::Duration::minutes(1)),
            status: MessageStatus::Scheduled,
            message_number: None,
            trigger_key: None,
            follow_up_delay_secs: None,
        }
    }

    #[tokio::test]
    async fn test_interval_throttles_second_send() {
        let h = harness(MockTransport::new()).await;
        h.messages.create(message("main")).await.unwrap();
        h.messages.create(message("main")).await.unwrap();

        // First tick sends exactly one of the two eligible messages
        h.dispatcher.tick().await.unwrap();
        assert_eq!(h.transport.sent_count().await, 1);

        // Default interval is 60s: an immediate second tick sends nothing
        h.dispatcher.tick().await.unwrap();
        assert_eq!(h.transport.sent_count().await, 1);

        // With the interval lifted the second message goes out
        h.settings
            .update(
                "main",
                UpdateSenderSettings {
                    send_interval_secs: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        h.dispatcher.tick().await.unwrap();
        assert_eq!(h.transport.sent_count().await, 2);
    }

    #[tokio::test]
    async fn test_send_renders_placeholders() {
        let h = harness(MockTransport::new()).await;
        h.settings
            .update(
                "main",
                UpdateSenderSettings {
                    send_interval_secs: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        h.messages.create(message("main")).await.unwrap();
        h.dispatcher.tick().await.unwrap();

        let sent = h.transport.sent.lock().await;
        assert_eq!(sent[0].0, "5491155550001");
        assert_eq!(sent[0].1, "Hola Maria");
    }

    #[tokio::test]
    async fn test_failed_send_is_recorded_not_retried() {
        let h = harness(MockTransport::failing()).await;
        let created = h.messages.create(message("main")).await.unwrap();

        h.dispatcher.tick().await.unwrap();

        let failed = h.messages.get(created.id).await.unwrap().unwrap();
        assert_eq!(failed.status, "failed");
        assert!(failed
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("provider said no"));

        let history = h.messages.history(created.id).await.unwrap();
        let statuses: Vec<_> = history.iter().map(|h| h.status.as_str()).collect();
        assert_eq!(statuses, vec!["scheduled", "sending", "failed"]);

        // No automatic retry on the next tick
        h.dispatcher.tick().await.unwrap();
        let still_failed = h.messages.get(created.id).await.unwrap().unwrap();
        assert_eq!(still_failed.status, "failed");
    }

    #[tokio::test]
    async fn test_disabled_account_is_skipped() {
        let h = harness(MockTransport::new()).await;
        h.settings
            .update(
                "main",
                UpdateSenderSettings {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let created = h.messages.create(message("main")).await.unwrap();
        h.dispatcher.tick().await.unwrap();

        let row = h.messages.get(created.id).await.unwrap().unwrap();
        assert_eq!(row.status, "scheduled");
        assert_eq!(h.transport.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_closed_window_keeps_message_scheduled() {
        let h = harness(MockTransport::new()).await;
        // start == end: the window never opens
        h.settings
            .update(
                "main",
                UpdateSenderSettings {
                    work_start: Some("09:00".to_string()),
                    work_end: Some("09:00".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let created = h.messages.create(message("main")).await.unwrap();
        h.dispatcher.tick().await.unwrap();

        let row = h.messages.get(created.id).await.unwrap().unwrap();
        assert_eq!(row.status, "scheduled");
    }

    #[tokio::test]
    async fn test_disconnected_account_messages_stay_queued() {
        let transport = MockTransport::new();
        transport.connected.store(false, Ordering::SeqCst);
        let h = harness(transport).await;

        let created = h.messages.create(message("main")).await.unwrap();
        h.dispatcher.tick().await.unwrap();

        let row = h.messages.get(created.id).await.unwrap().unwrap();
        assert_eq!(row.status, "scheduled");
    }

    #[tokio::test]
    async fn test_drip_follow_up_sent_only_after_first() {
        let h = harness(MockTransport::new()).await;
        h.settings
            .update(
                "main",
                UpdateSenderSettings {
                    send_interval_secs: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let now = Utc::now();
        let trigger = DripTrigger {
            trigger_key: "sale-0001".to_string(),
            customer_name: Some("Maria".to_string()),
            phone: "5491155550001".to_string(),
            document: Some("0001".to_string()),
            amount: None,
            triggered_at: now,
            processed_at: now,
        };

        let mut first = message("main");
        first.message_number = Some(1);
        first.trigger_key = Some("sale-0001".to_string());

        let mut second = message("main");
        second.scheduled_at = None;
        second.status = MessageStatus::ScheduledFuture;
        second.message_number = Some(2);
        second.trigger_key = Some("sale-0001".to_string());
        second.follow_up_delay_secs = Some(0);

        let (first_id, second_id) = h
            .messages
            .create_drip_pair(&trigger, first, second)
            .await
            .unwrap()
            .unwrap();

        // First tick: only the first message is eligible
        h.dispatcher.tick().await.unwrap();
        assert_eq!(h.transport.sent_count().await, 1);
        let first_row = h.messages.get(first_id).await.unwrap().unwrap();
        assert_eq!(first_row.status, "sent");

        // The sibling was released with a zero delay and goes out next tick
        let second_row = h.messages.get(second_id).await.unwrap().unwrap();
        assert_eq!(second_row.status, "scheduled");
        assert_eq!(second_row.scheduled_at, first_row.sent_at);

        h.dispatcher.tick().await.unwrap();
        assert_eq!(h.transport.sent_count().await, 2);
    }
}
