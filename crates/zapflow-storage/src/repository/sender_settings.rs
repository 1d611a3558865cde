//! Per-account sender settings repository

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{SenderSettings, UpdateSenderSettings};
use crate::repository::scheduled_messages::ScheduledMessageRepository;

/// Sender settings repository
#[derive(Clone)]
pub struct SenderSettingsRepository {
    pool: SqlitePool,
}

impl SenderSettingsRepository {
    /// Create a new sender settings repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get settings for an account, creating the defaults row on first read
    pub async fn get_or_default(&self, account_id: &str) -> Result<SenderSettings, sqlx::Error> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO sender_settings (account_id, created_at, updated_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(account_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, SenderSettings>("SELECT * FROM sender_settings WHERE account_id = ?")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await
    }

    /// List every account with a settings row
    pub async fn list(&self) -> Result<Vec<SenderSettings>, sqlx::Error> {
        sqlx::query_as::<_, SenderSettings>("SELECT * FROM sender_settings ORDER BY account_id")
            .fetch_all(&self.pool)
            .await
    }

    /// Update settings for an account, creating the row first if needed
    pub async fn update(
        &self,
        account_id: &str,
        input: UpdateSenderSettings,
    ) -> Result<SenderSettings, sqlx::Error> {
        // Ensure the row exists so a fresh account can be configured directly
        self.get_or_default(account_id).await?;

        sqlx::query_as::<_, SenderSettings>(
            r#"
            UPDATE sender_settings SET
                work_start = coalesce(?, work_start),
                work_end = coalesce(?, work_end),
                send_interval_secs = coalesce(?, send_interval_secs),
                enabled = coalesce(?, enabled),
                timezone = coalesce(?, timezone),
                updated_at = ?
            WHERE account_id = ?
            RETURNING *
            "#,
        )
        .bind(&input.work_start)
        .bind(&input.work_end)
        .bind(input.send_interval_secs)
        .bind(input.enabled)
        .bind(&input.timezone)
        .bind(Utc::now())
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
    }

    /// Remove an account's settings row together with its dependent
    /// scheduled messages and their history. The cascade is explicit here
    /// rather than delegated to engine pragma behavior.
    pub async fn delete_account(&self, account_id: &str) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let removed_messages =
            ScheduledMessageRepository::delete_by_account(&mut tx, account_id).await?;

        sqlx::query("DELETE FROM sender_settings WHERE account_id = ?")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(removed_messages)
    }
}
