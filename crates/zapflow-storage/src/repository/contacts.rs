//! Contact repository

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;
use zapflow_common::types::ContactId;

use crate::models::{Contact, CreateContact, UpdateContact};

/// Contact repository
#[derive(Clone)]
pub struct ContactRepository {
    pool: SqlitePool,
}

impl ContactRepository {
    /// Create a new contact repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new contact
    pub async fn create(&self, input: CreateContact) -> Result<Contact, sqlx::Error> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts (id, name, surname, email, birthday, phone, source, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.surname)
        .bind(&input.email)
        .bind(input.birthday)
        .bind(&input.phone)
        .bind(input.source.to_string())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    /// Insert a batch of contacts in one transaction
    pub async fn create_batch(&self, inputs: Vec<CreateContact>) -> Result<u64, sqlx::Error> {
        let mut count = 0u64;
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        for input in inputs {
            let result = sqlx::query(
                r#"
                INSERT INTO contacts (id, name, surname, email, birthday, phone, source, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&input.name)
            .bind(&input.surname)
            .bind(&input.email)
            .bind(input.birthday)
            .bind(&input.phone)
            .bind(input.source.to_string())
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            count += result.rows_affected();
        }

        tx.commit().await?;
        Ok(count)
    }

    /// Get a contact by ID
    pub async fn get(&self, id: ContactId) -> Result<Option<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get several contacts by ID
    pub async fn get_many(&self, ids: &[ContactId]) -> Result<Vec<Contact>, sqlx::Error> {
        let mut contacts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(contact) = self.get(*id).await? {
                contacts.push(contact);
            }
        }
        Ok(contacts)
    }

    /// Paginated case-insensitive substring search over name/surname/email/phone.
    /// An empty query lists everything.
    pub async fn search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Contact>, sqlx::Error> {
        let pattern = format!("%{}%", query.to_lowercase());

        sqlx::query_as::<_, Contact>(
            r#"
            SELECT * FROM contacts
            WHERE lower(coalesce(name, '')) LIKE ?
               OR lower(coalesce(surname, '')) LIKE ?
               OR lower(coalesce(email, '')) LIKE ?
               OR phone LIKE ?
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Total number of contacts matching a search query
    pub async fn count_search(&self, query: &str) -> Result<i64, sqlx::Error> {
        let pattern = format!("%{}%", query.to_lowercase());

        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM contacts
            WHERE lower(coalesce(name, '')) LIKE ?
               OR lower(coalesce(surname, '')) LIKE ?
               OR lower(coalesce(email, '')) LIKE ?
               OR phone LIKE ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    /// All ids matching a search query, for select-all-across-pages
    pub async fn search_ids(&self, query: &str) -> Result<Vec<ContactId>, sqlx::Error> {
        let pattern = format!("%{}%", query.to_lowercase());

        let rows: Vec<(ContactId,)> = sqlx::query_as(
            r#"
            SELECT id FROM contacts
            WHERE lower(coalesce(name, '')) LIKE ?
               OR lower(coalesce(surname, '')) LIKE ?
               OR lower(coalesce(email, '')) LIKE ?
               OR phone LIKE ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Update a contact
    pub async fn update(
        &self,
        id: ContactId,
        input: UpdateContact,
    ) -> Result<Option<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            r#"
            UPDATE contacts SET
                name = coalesce(?, name),
                surname = coalesce(?, surname),
                email = coalesce(?, email),
                birthday = coalesce(?, birthday),
                phone = coalesce(?, phone),
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.surname)
        .bind(&input.email)
        .bind(input.birthday)
        .bind(&input.phone)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a contact
    pub async fn delete(&self, id: ContactId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a list of contacts in one transaction
    pub async fn delete_many(&self, ids: &[ContactId]) -> Result<u64, sqlx::Error> {
        let mut count = 0u64;
        let mut tx = self.pool.begin().await?;

        for id in ids {
            let result = sqlx::query("DELETE FROM contacts WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            count += result.rows_affected();
        }

        tx.commit().await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabasePool;
    use crate::models::ContactSource;

    async fn repo() -> ContactRepository {
        let db = DatabasePool::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        ContactRepository::new(db.pool().clone())
    }

    fn contact(name: &str, phone: &str) -> CreateContact {
        CreateContact {
            name: Some(name.to_string()),
            surname: None,
            email: None,
            birthday: None,
            phone: phone.to_string(),
            source: ContactSource::Manual,
        }
    }

    #[tokio::test]
    async fn test_create_and_search() {
        let repo = repo().await;
        repo.create(contact("Maria", "5491155550001")).await.unwrap();
        repo.create(contact("Marcos", "5491155550002")).await.unwrap();
        repo.create(contact("Ana", "5491155550003")).await.unwrap();

        let hits = repo.search("mar", 50, 0).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(repo.count_search("mar").await.unwrap(), 2);

        let by_phone = repo.search("0003", 50, 0).await.unwrap();
        assert_eq!(by_phone.len(), 1);
        assert_eq!(by_phone[0].name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_search_ids_and_bulk_delete() {
        let repo = repo().await;
        repo.create(contact("Maria", "111")).await.unwrap();
        repo.create(contact("Mara", "222")).await.unwrap();
        repo.create(contact("Luis", "333")).await.unwrap();

        let ids = repo.search_ids("mar").await.unwrap();
        assert_eq!(ids.len(), 2);

        let deleted = repo.delete_many(&ids).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(repo.count_search("").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_unset_fields() {
        let repo = repo().await;
        let created = repo.create(contact("Maria", "111")).await.unwrap();

        let updated = repo
            .update(
                created.id,
                UpdateContact {
                    email: Some("maria@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name.as_deref(), Some("Maria"));
        assert_eq!(updated.email.as_deref(), Some("maria@example.com"));
        assert_eq!(updated.phone, "111");
    }
}
