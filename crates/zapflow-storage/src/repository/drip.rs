//! Drip rule settings and trigger ledger repository

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{DripSettings, DripTrigger, UpdateDripSettings};

/// Drip settings repository (singleton row plus the processed-trigger ledger)
#[derive(Clone)]
pub struct DripRepository {
    pool: SqlitePool,
}

impl DripRepository {
    /// Create a new drip repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the drip settings, creating the defaults row on first read
    pub async fn get_or_default(&self) -> Result<DripSettings, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO drip_settings (id, updated_at) VALUES (1, ?)
            "#,
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, DripSettings>("SELECT * FROM drip_settings WHERE id = 1")
            .fetch_one(&self.pool)
            .await
    }

    /// Update the drip settings. Changes never touch already-materialized
    /// message pairs; their delays and content were frozen at creation.
    pub async fn update(&self, input: UpdateDripSettings) -> Result<DripSettings, sqlx::Error> {
        self.get_or_default().await?;

        let first_images = input
            .first_images
            .map(|i| serde_json::to_value(i).unwrap_or_else(|_| serde_json::json!([])));
        let second_images = input
            .second_images
            .map(|i| serde_json::to_value(i).unwrap_or_else(|_| serde_json::json!([])));

        sqlx::query_as::<_, DripSettings>(
            r#"
            UPDATE drip_settings SET
                enabled = coalesce(?, enabled),
                account_id = coalesce(?, account_id),
                first_delay_value = coalesce(?, first_delay_value),
                first_delay_unit = coalesce(?, first_delay_unit),
                second_delay_value = coalesce(?, second_delay_value),
                second_delay_unit = coalesce(?, second_delay_unit),
                first_body = coalesce(?, first_body),
                first_images = coalesce(?, first_images),
                second_body = coalesce(?, second_body),
                second_images = coalesce(?, second_images),
                updated_at = ?
            WHERE id = 1
            RETURNING *
            "#,
        )
        .bind(input.enabled)
        .bind(&input.account_id)
        .bind(input.first_delay_value)
        .bind(&input.first_delay_unit)
        .bind(input.second_delay_value)
        .bind(&input.second_delay_unit)
        .bind(&input.first_body)
        .bind(first_images)
        .bind(&input.second_body)
        .bind(second_images)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    /// Whether a trigger key has already been materialized
    pub async fn trigger_exists(&self, trigger_key: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT trigger_key FROM drip_triggers WHERE trigger_key = ?")
                .bind(trigger_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// List processed triggers, newest first
    pub async fn list_triggers(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DripTrigger>, sqlx::Error> {
        sqlx::query_as::<_, DripTrigger>(
            "SELECT * FROM drip_triggers ORDER BY processed_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabasePool;

    async fn repo() -> DripRepository {
        let db = DatabasePool::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        DripRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_defaults() {
        let repo = repo().await;
        let settings = repo.get_or_default().await.unwrap();
        assert!(!settings.enabled);
        assert_eq!(settings.first_delay_value, 1);
        assert_eq!(settings.first_delay_unit, "days");
        assert_eq!(settings.second_delay_value, 7);
    }

    #[tokio::test]
    async fn test_update_delays() {
        let repo = repo().await;
        let updated = repo
            .update(UpdateDripSettings {
                enabled: Some(true),
                account_id: Some("main".to_string()),
                first_delay_value: Some(30),
                first_delay_unit: Some("minutes".to_string()),
                first_body: Some("Gracias {name}!".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(updated.enabled);
        assert_eq!(updated.first_delay_secs(), 1800);
        assert_eq!(updated.first_body, "Gracias {name}!");
        // Untouched fields keep their defaults
        assert_eq!(updated.second_delay_value, 7);
    }
}
