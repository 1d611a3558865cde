//! Contact import - validation, normalization, dedup
//!
//! Import files can carry tens of thousands of rows. Validation runs in
//! bounded slices and yields between them so the dispatch loop and the API
//! stay responsive while a large import is in flight.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;
use zapflow_common::types::PhoneNumber;
use zapflow_storage::models::{ContactSource, CreateContact};
use zapflow_storage::repository::ContactRepository;

use super::OutreachError;

/// How many records to validate/insert per slice
const IMPORT_CHUNK: usize = 500;

/// A loosely-typed record from an already-parsed import file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportRecord {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    /// Birthday as "YYYY-MM-DD"; anything else is dropped silently
    pub birthday: Option<String>,
    pub phone: Option<String>,
}

/// A rejected record with a human-readable reason
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRecord {
    /// Zero-based position in the submitted batch
    pub index: usize,
    pub phone: Option<String>,
    pub reason: String,
}

/// Result of an import run
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub imported: u64,
    pub skipped: Vec<SkippedRecord>,
    pub total: usize,
}

/// Contact importer
pub struct ContactImporter {
    contacts: ContactRepository,
    chunk_size: usize,
}

impl ContactImporter {
    pub fn new(contacts: ContactRepository) -> Self {
        Self {
            contacts,
            chunk_size: IMPORT_CHUNK,
        }
    }

    /// Override the slice size (tests use small slices)
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Validate and persist a batch of records.
    ///
    /// Records without a phone number, or whose normalized phone duplicates
    /// one seen earlier in the same batch, are skipped with a reason. Phones
    /// already in the store are not deduplicated: the batch is the dedup
    /// scope.
    pub async fn import(&self, records: Vec<ImportRecord>) -> Result<ImportOutcome, OutreachError> {
        let total = records.len();
        let mut seen = std::collections::HashSet::new();
        let mut skipped = Vec::new();
        let mut imported = 0u64;

        for (chunk_index, chunk) in records.chunks(self.chunk_size).enumerate() {
            let mut accepted = Vec::with_capacity(chunk.len());
            let base = chunk_index * self.chunk_size;

            for (offset, record) in chunk.iter().enumerate() {
                let index = base + offset;

                let normalized = record
                    .phone
                    .as_deref()
                    .and_then(PhoneNumber::normalize);

                let Some(phone) = normalized else {
                    skipped.push(SkippedRecord {
                        index,
                        phone: record.phone.clone(),
                        reason: "missing phone number".to_string(),
                    });
                    continue;
                };

                if !seen.insert(phone.clone()) {
                    skipped.push(SkippedRecord {
                        index,
                        phone: Some(phone.into_string()),
                        reason: "duplicate phone number in batch".to_string(),
                    });
                    continue;
                }

                accepted.push(CreateContact {
                    name: record.name.clone(),
                    surname: record.surname.clone(),
                    email: record.email.clone(),
                    birthday: record
                        .birthday
                        .as_deref()
                        .and_then(|b| NaiveDate::parse_from_str(b, "%Y-%m-%d").ok()),
                    phone: phone.into_string(),
                    source: ContactSource::Import,
                });
            }

            if !accepted.is_empty() {
                imported += self.contacts.create_batch(accepted).await?;
            }

            // Keep the runtime responsive between slices
            tokio::task::yield_now().await;
        }

        info!(
            imported,
            skipped = skipped.len(),
            total,
            "Contact import finished"
        );

        Ok(ImportOutcome {
            imported,
            skipped,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use zapflow_storage::DatabasePool;

    async fn importer() -> ContactImporter {
        let db = DatabasePool::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        ContactImporter::new(ContactRepository::new(db.pool().clone()))
    }

    fn record(phone: Option<&str>) -> ImportRecord {
        ImportRecord {
            phone: phone.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_phone_skipped() {
        let importer = importer().await;

        let outcome = importer
            .import(vec![record(Some("123")), record(Some("123")), record(None)])
            .await
            .unwrap();

        assert_eq!(outcome.imported, 1);
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.skipped.len(), 2);
        assert_eq!(outcome.skipped[0].reason, "duplicate phone number in batch");
        assert_eq!(outcome.skipped[0].index, 1);
        assert_eq!(outcome.skipped[1].reason, "missing phone number");
        assert_eq!(outcome.skipped[1].index, 2);
    }

    #[tokio::test]
    async fn test_normalization_dedups_formatted_variants() {
        let importer = importer().await;

        // Same number written two ways collapses to one contact
        let outcome = importer
            .import(vec![
                record(Some("+54 9 11 5555-0001")),
                record(Some("5491155550001")),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.imported, 1);
        assert_eq!(outcome.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_dedup_spans_chunks() {
        let importer = importer().await.with_chunk_size(2);

        let outcome = importer
            .import(vec![
                record(Some("111")),
                record(Some("222")),
                record(Some("111")),
                record(Some("333")),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.imported, 3);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].index, 2);
    }
}
