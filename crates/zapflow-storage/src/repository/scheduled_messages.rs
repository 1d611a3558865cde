//! Scheduled message repository
//!
//! Status changes and their history entries always commit in one
//! transaction, so a row's status and its history can never disagree.
//! Claims use compare-and-swap UPDATEs on the current status; the embedded
//! engine has no row locks to lean on, so the guard in the WHERE clause is
//! what keeps two dispatch ticks from selecting the same message.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;
use zapflow_common::types::MessageId;

use crate::models::{
    CreateScheduledMessage, DripTrigger, MessageStatus, MessageStatusCounts, ScheduledMessage,
    StatusHistoryEntry,
};

/// Message counts grouped by drip message number
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MessageNumberCounts {
    pub first: i64,
    pub second: i64,
    pub manual: i64,
}

/// Scheduled message repository
#[derive(Clone)]
pub struct ScheduledMessageRepository {
    pool: SqlitePool,
}

impl ScheduledMessageRepository {
    /// Create a new scheduled message repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_message(
        tx: &mut Transaction<'_, Sqlite>,
        input: &CreateScheduledMessage,
        now: DateTime<Utc>,
    ) -> Result<MessageId, sqlx::Error> {
        let id = Uuid::new_v4();
        let images = serde_json::to_value(input.images.clone().unwrap_or_default())
            .unwrap_or_else(|_| serde_json::json!([]));
        let extra_vars = input
            .extra_vars
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));

        sqlx::query(
            r#"
            INSERT INTO scheduled_messages (
                id, account_id, contact_id,
                recipient_name, recipient_surname, recipient_phone,
                recipient_email, recipient_birthday,
                body, images, extra_vars,
                scheduled_at, status, message_number, trigger_key,
                follow_up_delay_secs, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&input.account_id)
        .bind(input.contact_id)
        .bind(&input.recipient_name)
        .bind(&input.recipient_surname)
        .bind(&input.recipient_phone)
        .bind(&input.recipient_email)
        .bind(input.recipient_birthday)
        .bind(&input.body)
        .bind(images)
        .bind(extra_vars)
        .bind(input.scheduled_at)
        .bind(input.status.to_string())
        .bind(input.message_number)
        .bind(&input.trigger_key)
        .bind(input.follow_up_delay_secs)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        Self::append_history(tx, id, input.status, None, now).await?;

        Ok(id)
    }

    async fn append_history(
        tx: &mut Transaction<'_, Sqlite>,
        message_id: MessageId,
        status: MessageStatus,
        note: Option<&str>,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO message_status_history (id, message_id, status, note, occurred_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(message_id)
        .bind(status.to_string())
        .bind(note)
        .bind(occurred_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Create a single scheduled message with its initial history entry
    pub async fn create(
        &self,
        input: CreateScheduledMessage,
    ) -> Result<ScheduledMessage, sqlx::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let id = Self::insert_message(&mut tx, &input, now).await?;
        tx.commit().await?;

        self.get(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Create a batch of scheduled messages in one transaction
    pub async fn create_batch(
        &self,
        inputs: Vec<CreateScheduledMessage>,
    ) -> Result<Vec<MessageId>, sqlx::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(inputs.len());

        for input in &inputs {
            ids.push(Self::insert_message(&mut tx, input, now).await?);
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Atomically record a drip trigger and materialize its message pair.
    /// Returns `None` when the trigger key was already processed; nothing is
    /// written in that case. Either the trigger row and both messages commit
    /// together or none of them do.
    pub async fn create_drip_pair(
        &self,
        trigger: &DripTrigger,
        first: CreateScheduledMessage,
        second: CreateScheduledMessage,
    ) -> Result<Option<(MessageId, MessageId)>, sqlx::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT trigger_key FROM drip_triggers WHERE trigger_key = ?")
                .bind(&trigger.trigger_key)
                .fetch_optional(&mut *tx)
                .await?;

        if existing.is_some() {
            return Ok(None);
        }

        sqlx::query(
            r#"
            INSERT INTO drip_triggers (trigger_key, customer_name, phone, document, amount, triggered_at, processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trigger.trigger_key)
        .bind(&trigger.customer_name)
        .bind(&trigger.phone)
        .bind(&trigger.document)
        .bind(trigger.amount)
        .bind(trigger.triggered_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let first_id = Self::insert_message(&mut tx, &first, now).await?;
        let second_id = Self::insert_message(&mut tx, &second, now).await?;

        tx.commit().await?;
        Ok(Some((first_id, second_id)))
    }

    /// Get a scheduled message by ID
    pub async fn get(&self, id: MessageId) -> Result<Option<ScheduledMessage>, sqlx::Error> {
        sqlx::query_as::<_, ScheduledMessage>("SELECT * FROM scheduled_messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Find a message by the provider-assigned identifier
    pub async fn get_by_provider_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<ScheduledMessage>, sqlx::Error> {
        sqlx::query_as::<_, ScheduledMessage>(
            "SELECT * FROM scheduled_messages WHERE provider_message_id = ?",
        )
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// List messages, optionally filtered by status, oldest scheduled first
    pub async fn list(
        &self,
        status: Option<MessageStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ScheduledMessage>, sqlx::Error> {
        if let Some(status) = status {
            sqlx::query_as::<_, ScheduledMessage>(
                r#"
                SELECT * FROM scheduled_messages
                WHERE status = ?
                ORDER BY created_at DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(status.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, ScheduledMessage>(
                r#"
                SELECT * FROM scheduled_messages
                ORDER BY created_at DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// Count messages, optionally filtered by status
    pub async fn count(&self, status: Option<MessageStatus>) -> Result<i64, sqlx::Error> {
        let count: (i64,) = if let Some(status) = status {
            sqlx::query_as("SELECT COUNT(*) FROM scheduled_messages WHERE status = ?")
                .bind(status.to_string())
                .fetch_one(&self.pool)
                .await?
        } else {
            sqlx::query_as("SELECT COUNT(*) FROM scheduled_messages")
                .fetch_one(&self.pool)
                .await?
        };
        Ok(count.0)
    }

    /// Ordered status history for a message
    pub async fn history(
        &self,
        message_id: MessageId,
    ) -> Result<Vec<StatusHistoryEntry>, sqlx::Error> {
        sqlx::query_as::<_, StatusHistoryEntry>(
            r#"
            SELECT * FROM message_status_history
            WHERE message_id = ?
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await
    }

    /// The oldest scheduled message whose eligible instant has passed,
    /// for one account. Working-hour checks happen in the caller; they are
    /// account-level, not row-level.
    pub async fn next_ready(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledMessage>, sqlx::Error> {
        sqlx::query_as::<_, ScheduledMessage>(
            r#"
            SELECT * FROM scheduled_messages
            WHERE account_id = ?
              AND status = 'scheduled'
              AND scheduled_at IS NOT NULL
              AND scheduled_at <= ?
            ORDER BY scheduled_at ASC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }

    /// Number of messages currently in flight for an account
    pub async fn count_sending(&self, account_id: &str) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM scheduled_messages WHERE account_id = ? AND status = 'sending'",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// Most recent sent instant for an account, for interval throttling.
    /// Read from the store so the throttle survives restarts.
    pub async fn last_sent_at(
        &self,
        account_id: &str,
    ) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        let row: (Option<DateTime<Utc>>,) = sqlx::query_as(
            "SELECT MAX(sent_at) FROM scheduled_messages WHERE account_id = ? AND sent_at IS NOT NULL",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Atomically claim a scheduled message for sending.
    /// Returns false when another claimer got there first.
    pub async fn claim_sending(&self, id: MessageId) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE scheduled_messages SET
                status = 'sending',
                updated_at = ?
            WHERE id = ? AND status = 'scheduled'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        Self::append_history(&mut tx, id, MessageStatus::Sending, None, now).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Mark an in-flight message as sent and record the provider id
    pub async fn mark_sent(
        &self,
        id: MessageId,
        provider_message_id: &str,
    ) -> Result<Option<ScheduledMessage>, sqlx::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE scheduled_messages SET
                status = 'sent',
                provider_message_id = ?,
                sent_at = ?,
                updated_at = ?
            WHERE id = ? AND status = 'sending'
            "#,
        )
        .bind(provider_message_id)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Self::append_history(&mut tx, id, MessageStatus::Sent, None, now).await?;
        tx.commit().await?;

        self.get(id).await
    }

    /// Mark an in-flight message as failed with a reason.
    /// No automatic retry: a failed row stays failed until a human
    /// re-schedules it.
    pub async fn mark_failed(
        &self,
        id: MessageId,
        reason: &str,
    ) -> Result<Option<ScheduledMessage>, sqlx::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE scheduled_messages SET
                status = 'failed',
                failure_reason = ?,
                updated_at = ?
            WHERE id = ? AND status = 'sending'
            "#,
        )
        .bind(reason)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Self::append_history(&mut tx, id, MessageStatus::Failed, Some(reason), now).await?;
        tx.commit().await?;

        self.get(id).await
    }

    /// Record a delivery acknowledgement transition. The expected current
    /// status guards the UPDATE so a concurrent writer cannot be overwritten.
    pub async fn apply_delivery_transition(
        &self,
        id: MessageId,
        from: MessageStatus,
        to: MessageStatus,
        occurred_at: DateTime<Utc>,
        note: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE scheduled_messages SET
                status = ?,
                updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.to_string())
        .bind(Utc::now())
        .bind(id)
        .bind(from.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        Self::append_history(&mut tx, id, to, note, occurred_at).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Promote due drip first messages to scheduled.
    /// Returns the number of rows promoted.
    pub async fn promote_due_pending(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let due: Vec<(MessageId,)> = sqlx::query_as(
            r#"
            SELECT id FROM scheduled_messages
            WHERE status = 'pending_first_message'
              AND scheduled_at IS NOT NULL
              AND scheduled_at <= ?
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut promoted = 0u64;
        for (id,) in due {
            let mut tx = self.pool.begin().await?;
            let result = sqlx::query(
                r#"
                UPDATE scheduled_messages SET
                    status = 'scheduled',
                    updated_at = ?
                WHERE id = ? AND status = 'pending_first_message'
                "#,
            )
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                Self::append_history(&mut tx, id, MessageStatus::Scheduled, None, now).await?;
                tx.commit().await?;
                promoted += 1;
            }
        }

        Ok(promoted)
    }

    /// Release a pinned drip second message once its sibling was sent:
    /// computes the eligible instant from the delay frozen on the row and
    /// flips scheduled_future to scheduled.
    pub async fn promote_follow_up(
        &self,
        trigger_key: &str,
        sibling_sent_at: DateTime<Utc>,
    ) -> Result<Option<ScheduledMessage>, sqlx::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let row: Option<(MessageId, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT id, follow_up_delay_secs FROM scheduled_messages
            WHERE trigger_key = ? AND message_number = 2 AND status = 'scheduled_future'
            "#,
        )
        .bind(trigger_key)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id, delay_secs)) = row else {
            return Ok(None);
        };

        let not_before = sibling_sent_at + chrono::Duration::seconds(delay_secs.unwrap_or(0));

        sqlx::query(
            r#"
            UPDATE scheduled_messages SET
                status = 'scheduled',
                scheduled_at = ?,
                updated_at = ?
            WHERE id = ? AND status = 'scheduled_future'
            "#,
        )
        .bind(not_before)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        Self::append_history(&mut tx, id, MessageStatus::Scheduled, None, now).await?;
        tx.commit().await?;

        self.get(id).await
    }

    /// Cancel a message. Only legal before dispatch; returns the updated row
    /// or `None` when the row was missing or not in a cancellable state.
    pub async fn cancel(&self, id: MessageId) -> Result<Option<ScheduledMessage>, sqlx::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE scheduled_messages SET
                status = 'cancelled',
                updated_at = ?
            WHERE id = ? AND status IN ('scheduled', 'pending_first_message', 'scheduled_future')
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Self::append_history(&mut tx, id, MessageStatus::Cancelled, Some("cancelled by user"), now)
            .await?;
        tx.commit().await?;

        self.get(id).await
    }

    /// Delete a message and its history. In-flight rows are refused.
    pub async fn delete(&self, id: MessageId) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM scheduled_messages WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        match row {
            None => return Ok(false),
            Some((status,)) if status == "sending" => return Ok(false),
            Some(_) => {}
        }

        // History cascade is explicit, not engine-dependent; children go
        // first so the foreign key holds
        sqlx::query("DELETE FROM message_status_history WHERE message_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM scheduled_messages WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Delete a list of messages; in-flight rows are skipped
    pub async fn delete_many(&self, ids: &[MessageId]) -> Result<u64, sqlx::Error> {
        let mut count = 0u64;
        for id in ids {
            if self.delete(*id).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Delete every message (and history) belonging to an account.
    /// Used by the explicit account cascade.
    pub(crate) async fn delete_by_account(
        tx: &mut Transaction<'_, Sqlite>,
        account_id: &str,
    ) -> Result<u64, sqlx::Error> {
        sqlx::query(
            r#"
            DELETE FROM message_status_history
            WHERE message_id IN (SELECT id FROM scheduled_messages WHERE account_id = ?)
            "#,
        )
        .bind(account_id)
        .execute(&mut **tx)
        .await?;

        let result = sqlx::query("DELETE FROM scheduled_messages WHERE account_id = ?")
            .bind(account_id)
            .execute(&mut **tx)
            .await?;

        Ok(result.rows_affected())
    }

    /// Counts by status within an optional created-at range
    pub async fn counts_by_status(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<MessageStatusCounts, sqlx::Error> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*) FROM scheduled_messages
            WHERE (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at <= ?)
            GROUP BY status
            "#,
        )
        .bind(from)
        .bind(from)
        .bind(to)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = MessageStatusCounts::default();
        for (status, count) in rows {
            counts.apply(&status, count);
        }
        Ok(counts)
    }

    /// Counts by drip message number within an optional created-at range
    pub async fn counts_by_message_number(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<MessageNumberCounts, sqlx::Error> {
        let rows: Vec<(Option<i64>, i64)> = sqlx::query_as(
            r#"
            SELECT message_number, COUNT(*) FROM scheduled_messages
            WHERE (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at <= ?)
            GROUP BY message_number
            "#,
        )
        .bind(from)
        .bind(from)
        .bind(to)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = MessageNumberCounts::default();
        for (number, count) in rows {
            match number {
                Some(1) => counts.first = count,
                Some(2) => counts.second = count,
                _ => counts.manual = count,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabasePool;
    use chrono::Duration;

    async fn repo() -> ScheduledMessageRepository {
        let db = DatabasePool::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        ScheduledMessageRepository::new(db.pool().clone())
    }

    fn message(account: &str, scheduled_at: Option<DateTime<Utc>>) -> CreateScheduledMessage {
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
            scheduled_at,
            status: MessageStatus::Scheduled,
            message_number: None,
            trigger_key: None,
            follow_up_delay_secs: None,
        }
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let repo = repo().await;
        let created = repo
            .create(message("main", Some(Utc::now() - Duration::minutes(1))))
            .await
            .unwrap();

        assert!(repo.claim_sending(created.id).await.unwrap());
        // Second claim loses the CAS
        assert!(!repo.claim_sending(created.id).await.unwrap());

        let history = repo.history(created.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, "scheduled");
        assert_eq!(history[1].status, "sending");
    }

    #[tokio::test]
    async fn test_next_ready_picks_oldest() {
        let repo = repo().await;
        let now = Utc::now();
        repo.create(message("main", Some(now - Duration::minutes(1))))
            .await
            .unwrap();
        let older = repo
            .create(message("main", Some(now - Duration::minutes(10))))
            .await
            .unwrap();
        // Future rows are never ready
        repo.create(message("main", Some(now + Duration::minutes(10))))
            .await
            .unwrap();

        let next = repo.next_ready("main", now).await.unwrap().unwrap();
        assert_eq!(next.id, older.id);
    }

    #[tokio::test]
    async fn test_cancel_rejected_after_claim() {
        let repo = repo().await;
        let created = repo.create(message("main", Some(Utc::now()))).await.unwrap();

        assert!(repo.claim_sending(created.id).await.unwrap());
        assert!(repo.cancel(created.id).await.unwrap().is_none());

        let cancelled = repo
            .create(message("main", Some(Utc::now())))
            .await
            .unwrap();
        let row = repo.cancel(cancelled.id).await.unwrap().unwrap();
        assert_eq!(row.status, "cancelled");
        // Second cancel is a conflict, history unchanged
        assert!(repo.cancel(cancelled.id).await.unwrap().is_none());
        assert_eq!(repo.history(cancelled.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_drip_pair_is_idempotent() {
        let repo = repo().await;
        let now = Utc::now();
        let trigger = DripTrigger {
            trigger_key: "sale-0001".to_string(),
            customer_name: Some("Maria".to_string()),
            phone: "5491155550001".to_string(),
            document: Some("0001".to_string()),
            amount: Some(120.0),
            triggered_at: now,
            processed_at: now,
        };

        let mut first = message("main", Some(now + Duration::hours(1)));
        first.status = MessageStatus::PendingFirstMessage;
        first.message_number = Some(1);
        first.trigger_key = Some("sale-0001".to_string());

        let mut second = message("main", None);
        second.status = MessageStatus::ScheduledFuture;
        second.message_number = Some(2);
        second.trigger_key = Some("sale-0001".to_string());
        second.follow_up_delay_secs = Some(7 * 86400);

        let pair = repo
            .create_drip_pair(&trigger, first.clone(), second.clone())
            .await
            .unwrap();
        assert!(pair.is_some());

        // Re-processing the same trigger writes nothing
        let dup = repo.create_drip_pair(&trigger, first, second).await.unwrap();
        assert!(dup.is_none());
        assert_eq!(repo.count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_promote_follow_up() {
        let repo = repo().await;
        let now = Utc::now();
        let trigger = DripTrigger {
            trigger_key: "sale-0002".to_string(),
            customer_name: None,
            phone: "5491155550002".to_string(),
            document: None,
            amount: None,
            triggered_at: now,
            processed_at: now,
        };

        let mut first = message("main", Some(now));
        first.message_number = Some(1);
        first.trigger_key = Some("sale-0002".to_string());

        let mut second = message("main", None);
        second.status = MessageStatus::ScheduledFuture;
        second.message_number = Some(2);
        second.trigger_key = Some("sale-0002".to_string());
        second.follow_up_delay_secs = Some(7 * 86400);

        repo.create_drip_pair(&trigger, first, second).await.unwrap();

        // Only the first message of the pair is ever ready while pinned
        assert!(repo.next_ready("main", now + Duration::days(30)).await.unwrap().is_some());
        let sent_at = now + Duration::hours(2);
        let promoted = repo
            .promote_follow_up("sale-0002", sent_at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(promoted.status, "scheduled");
        assert_eq!(promoted.scheduled_at.unwrap(), sent_at + Duration::days(7));

        // A second promotion finds nothing pinned
        assert!(repo
            .promote_follow_up("sale-0002", sent_at)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_counts_by_status() {
        let repo = repo().await;
        let now = Utc::now();
        repo.create(message("main", Some(now))).await.unwrap();
        let claimed = repo.create(message("main", Some(now))).await.unwrap();
        repo.claim_sending(claimed.id).await.unwrap();

        let counts = repo.counts_by_status(None, None).await.unwrap();
        assert_eq!(counts.scheduled, 1);
        assert_eq!(counts.sending, 1);
        assert_eq!(counts.total(), 2);
    }
}
