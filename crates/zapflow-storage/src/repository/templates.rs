//! Message template repository

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;
use zapflow_common::types::TemplateId;

use crate::models::{CreateTemplate, Template, UpdateTemplate};

/// Template repository
#[derive(Clone)]
pub struct TemplateRepository {
    pool: SqlitePool,
}

impl TemplateRepository {
    /// Create a new template repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new template
    pub async fn create(&self, input: CreateTemplate) -> Result<Template, sqlx::Error> {
        let now = Utc::now();
        let images = serde_json::to_value(input.images.unwrap_or_default())
            .unwrap_or_else(|_| serde_json::json!([]));

        sqlx::query_as::<_, Template>(
            r#"
            INSERT INTO templates (id, name, body, images, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.body)
        .bind(images)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a template by ID
    pub async fn get(&self, id: TemplateId) -> Result<Option<Template>, sqlx::Error> {
        sqlx::query_as::<_, Template>("SELECT * FROM templates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List templates, newest first
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Template>, sqlx::Error> {
        sqlx::query_as::<_, Template>(
            "SELECT * FROM templates ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Total number of templates
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM templates")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Update a template
    pub async fn update(
        &self,
        id: TemplateId,
        input: UpdateTemplate,
    ) -> Result<Option<Template>, sqlx::Error> {
        let images = input
            .images
            .map(|i| serde_json::to_value(i).unwrap_or_else(|_| serde_json::json!([])));

        sqlx::query_as::<_, Template>(
            r#"
            UPDATE templates SET
                name = coalesce(?, name),
                body = coalesce(?, body),
                images = coalesce(?, images),
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.body)
        .bind(images)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a template. Scheduled messages keep their snapshotted content.
    pub async fn delete(&self, id: TemplateId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM templates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabasePool;
    use crate::models::ImageAttachment;

    async fn repo() -> TemplateRepository {
        let db = DatabasePool::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        TemplateRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_create_with_images() {
        let repo = repo().await;
        let created = repo
            .create(CreateTemplate {
                name: "welcome".to_string(),
                body: "Hola {name}!".to_string(),
                images: Some(vec![ImageAttachment {
                    path: "/img/promo.jpg".to_string(),
                    caption: Some("Promo".to_string()),
                }]),
            })
            .await
            .unwrap();

        let images = created.images_vec();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].path, "/img/promo.jpg");
    }

    #[tokio::test]
    async fn test_update_body_only() {
        let repo = repo().await;
        let created = repo
            .create(CreateTemplate {
                name: "welcome".to_string(),
                body: "old".to_string(),
                images: None,
            })
            .await
            .unwrap();

        let updated = repo
            .update(
                created.id,
                UpdateTemplate {
                    body: Some("new".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name, "welcome");
        assert_eq!(updated.body, "new");
    }
}
