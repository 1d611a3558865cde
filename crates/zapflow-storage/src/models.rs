//! Database models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use zapflow_common::types::{AccountId, ContactId, MessageId, TemplateId};

/// Provenance of a contact record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    Manual,
    Import,
    Sale,
}

impl std::fmt::Display for ContactSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactSource::Manual => write!(f, "manual"),
            ContactSource::Import => write!(f, "import"),
            ContactSource::Sale => write!(f, "sale"),
        }
    }
}

impl std::str::FromStr for ContactSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(ContactSource::Manual),
            "import" => Ok(ContactSource::Import),
            "sale" => Ok(ContactSource::Sale),
            _ => Err(format!("Invalid contact source: {}", s)),
        }
    }
}

/// Contact model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub phone: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Get source enum
    pub fn source_enum(&self) -> Option<ContactSource> {
        self.source.parse().ok()
    }
}

/// Create contact input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateContact {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub phone: String,
    pub source: ContactSource,
}

/// Update contact input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateContact {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub phone: Option<String>,
}

/// An ordered image attachment on a template or message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub path: String,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Message template model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub body: String,
    pub images: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Get image attachments as a vector
    pub fn images_vec(&self) -> Vec<ImageAttachment> {
        serde_json::from_value(self.images.clone()).unwrap_or_default()
    }
}

/// Create template input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTemplate {
    pub name: String,
    pub body: String,
    pub images: Option<Vec<ImageAttachment>>,
}

/// Update template input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTemplate {
    pub name: Option<String>,
    pub body: Option<String>,
    pub images: Option<Vec<ImageAttachment>>,
}

/// Scheduled message status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Drip first message whose trigger delay has not elapsed yet
    PendingFirstMessage,
    /// Drip second message pinned until its sibling reaches sent
    ScheduledFuture,
    Scheduled,
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
    Cancelled,
}

impl MessageStatus {
    /// States from which a user cancellation is legal
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            MessageStatus::Scheduled
                | MessageStatus::PendingFirstMessage
                | MessageStatus::ScheduledFuture
        )
    }

    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MessageStatus::Read | MessageStatus::Failed | MessageStatus::Cancelled
        )
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::PendingFirstMessage => write!(f, "pending_first_message"),
            MessageStatus::ScheduledFuture => write!(f, "scheduled_future"),
            MessageStatus::Scheduled => write!(f, "scheduled"),
            MessageStatus::Sending => write!(f, "sending"),
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Read => write!(f, "read"),
            MessageStatus::Failed => write!(f, "failed"),
            MessageStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_first_message" => Ok(MessageStatus::PendingFirstMessage),
            "scheduled_future" => Ok(MessageStatus::ScheduledFuture),
            "scheduled" => Ok(MessageStatus::Scheduled),
            "sending" => Ok(MessageStatus::Sending),
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            "failed" => Ok(MessageStatus::Failed),
            "cancelled" => Ok(MessageStatus::Cancelled),
            _ => Err(format!("Invalid message status: {}", s)),
        }
    }
}

/// Scheduled message model
///
/// The recipient and the template content are snapshotted onto the row at
/// schedule time; later edits to the contact or template never change what
/// a queued message will say.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: MessageId,
    pub account_id: AccountId,
    pub contact_id: Option<ContactId>,
    pub recipient_name: Option<String>,
    pub recipient_surname: Option<String>,
    pub recipient_phone: String,
    pub recipient_email: Option<String>,
    pub recipient_birthday: Option<NaiveDate>,
    pub body: String,
    pub images: serde_json::Value,
    pub extra_vars: serde_json::Value,
    /// Earliest eligible send instant; null while the row is scheduled_future
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: String,
    /// 1 or 2 for drip-generated pairs, null for manual sends
    pub message_number: Option<i64>,
    pub trigger_key: Option<String>,
    /// Seconds between sibling sent-time and this row's eligibility,
    /// frozen at materialization (drip message 2 only)
    pub follow_up_delay_secs: Option<i64>,
    pub provider_message_id: Option<String>,
    pub failure_reason: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledMessage {
    /// Get status enum
    pub fn status_enum(&self) -> Option<MessageStatus> {
        self.status.parse().ok()
    }

    /// Get image attachments as a vector
    pub fn images_vec(&self) -> Vec<ImageAttachment> {
        serde_json::from_value(self.images.clone()).unwrap_or_default()
    }

    /// Whether this row belongs to a drip pair
    pub fn is_drip(&self) -> bool {
        self.trigger_key.is_some()
    }
}

/// Create scheduled message input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduledMessage {
    pub account_id: AccountId,
    pub contact_id: Option<ContactId>,
    pub recipient_name: Option<String>,
    pub recipient_surname: Option<String>,
    pub recipient_phone: String,
    pub recipient_email: Option<String>,
    pub recipient_birthday: Option<NaiveDate>,
    pub body: String,
    pub images: Option<Vec<ImageAttachment>>,
    pub extra_vars: Option<serde_json::Value>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: MessageStatus,
    pub message_number: Option<i64>,
    pub trigger_key: Option<String>,
    pub follow_up_delay_secs: Option<i64>,
}

/// Append-only status history entry
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: uuid::Uuid,
    pub message_id: MessageId,
    pub status: String,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Per-account sender settings
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SenderSettings {
    pub account_id: AccountId,
    /// Working-hour window open, "HH:MM" in the account timezone
    pub work_start: String,
    /// Working-hour window close (exclusive), "HH:MM"
    pub work_end: String,
    pub send_interval_secs: i64,
    pub enabled: bool,
    /// IANA timezone name, e.g. "America/Argentina/Buenos_Aires"
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Update sender settings input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSenderSettings {
    pub work_start: Option<String>,
    pub work_end: Option<String>,
    pub send_interval_secs: Option<i64>,
    pub enabled: Option<bool>,
    pub timezone: Option<String>,
}

/// Process-wide drip rule settings (singleton row)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DripSettings {
    pub id: i64,
    pub enabled: bool,
    pub account_id: AccountId,
    pub first_delay_value: i64,
    pub first_delay_unit: String,
    pub second_delay_value: i64,
    pub second_delay_unit: String,
    pub first_body: String,
    pub first_images: serde_json::Value,
    pub second_body: String,
    pub second_images: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl DripSettings {
    /// First-message delay in seconds
    pub fn first_delay_secs(&self) -> i64 {
        self.first_delay_unit
            .parse::<zapflow_common::types::DelayUnit>()
            .map(|u| u.to_seconds(self.first_delay_value))
            .unwrap_or(0)
    }

    /// Second-message delay in seconds
    pub fn second_delay_secs(&self) -> i64 {
        self.second_delay_unit
            .parse::<zapflow_common::types::DelayUnit>()
            .map(|u| u.to_seconds(self.second_delay_value))
            .unwrap_or(0)
    }

    /// First-message image attachments
    pub fn first_images_vec(&self) -> Vec<ImageAttachment> {
        serde_json::from_value(self.first_images.clone()).unwrap_or_default()
    }

    /// Second-message image attachments
    pub fn second_images_vec(&self) -> Vec<ImageAttachment> {
        serde_json::from_value(self.second_images.clone()).unwrap_or_default()
    }
}

/// Update drip settings input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDripSettings {
    pub enabled: Option<bool>,
    pub account_id: Option<AccountId>,
    pub first_delay_value: Option<i64>,
    pub first_delay_unit: Option<String>,
    pub second_delay_value: Option<i64>,
    pub second_delay_unit: Option<String>,
    pub first_body: Option<String>,
    pub first_images: Option<Vec<ImageAttachment>>,
    pub second_body: Option<String>,
    pub second_images: Option<Vec<ImageAttachment>>,
}

/// Processed drip trigger (idempotency ledger)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DripTrigger {
    pub trigger_key: String,
    pub customer_name: Option<String>,
    pub phone: String,
    pub document: Option<String>,
    pub amount: Option<f64>,
    pub triggered_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

/// Message counts grouped by status
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageStatusCounts {
    pub pending_first_message: i64,
    pub scheduled_future: i64,
    pub scheduled: i64,
    pub sending: i64,
    pub sent: i64,
    pub delivered: i64,
    pub read: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl MessageStatusCounts {
    pub fn total(&self) -> i64 {
        self.pending_first_message
            + self.scheduled_future
            + self.scheduled
            + self.sending
            + self.sent
            + self.delivered
            + self.read
            + self.failed
            + self.cancelled
    }

    /// Apply one (status, count) row from a GROUP BY query
    pub fn apply(&mut self, status: &str, count: i64) {
        match status.parse::<MessageStatus>() {
            Ok(MessageStatus::PendingFirstMessage) => self.pending_first_message = count,
            Ok(MessageStatus::ScheduledFuture) => self.scheduled_future = count,
            Ok(MessageStatus::Scheduled) => self.scheduled = count,
            Ok(MessageStatus::Sending) => self.sending = count,
            Ok(MessageStatus::Sent) => self.sent = count,
            Ok(MessageStatus::Delivered) => self.delivered = count,
            Ok(MessageStatus::Read) => self.read = count,
            Ok(MessageStatus::Failed) => self.failed = count,
            Ok(MessageStatus::Cancelled) => self.cancelled = count,
            Err(_) => {}
        }
    }
}
