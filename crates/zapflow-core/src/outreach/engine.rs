//! Scheduling engine
//!
//! Admits message requests into the durable queue and owns the eligibility
//! rules the dispatch loop evaluates. Template content and recipient data
//! are snapshotted onto each row at schedule time; placeholder values are
//! resolved later, at send time.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};
use zapflow_common::types::{ContactId, MessageId, TemplateId};
use zapflow_storage::models::{
    Contact, CreateScheduledMessage, MessageStatus, ScheduledMessage, SenderSettings,
};
use zapflow_storage::repository::{
    ContactRepository, ScheduledMessageRepository, TemplateRepository,
};

use super::OutreachError;
use crate::events::{EventBus, StatusEvent};

/// Scheduling engine
pub struct SchedulingEngine {
    messages: ScheduledMessageRepository,
    contacts: ContactRepository,
    templates: TemplateRepository,
    events: EventBus,
}

impl SchedulingEngine {
    /// Create a new scheduling engine
    pub fn new(
        messages: ScheduledMessageRepository,
        contacts: ContactRepository,
        templates: TemplateRepository,
        events: EventBus,
    ) -> Self {
        Self {
            messages,
            contacts,
            templates,
            events,
        }
    }

    /// Queue one message per contact for an account.
    ///
    /// `not_before` defaults to now. Contacts missing from the store are
    /// skipped with a warning; the rest of the batch still schedules.
    pub async fn schedule_bulk(
        &self,
        account_id: &str,
        contact_ids: &[ContactId],
        template_id: TemplateId,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageId>, OutreachError> {
        if contact_ids.is_empty() {
            return Err(OutreachError::Validation(
                "no contacts selected".to_string(),
            ));
        }

        let template = self
            .templates
            .get(template_id)
            .await?
            .ok_or_else(|| OutreachError::NotFound("template".to_string()))?;

        let scheduled_at = not_before.unwrap_or_else(Utc::now);
        let images = template.images_vec();

        let mut inputs = Vec::with_capacity(contact_ids.len());
        for contact_id in contact_ids {
            let Some(contact) = self.contacts.get(*contact_id).await? else {
                warn!(contact = %contact_id, "Skipping unknown contact in bulk schedule");
                continue;
            };
            inputs.push(Self::snapshot(account_id, &contact, &template.body, &images, scheduled_at));
        }

        if inputs.is_empty() {
            return Err(OutreachError::NotFound("contacts".to_string()));
        }

        let ids = self.messages.create_batch(inputs).await?;
        info!(
            account = %account_id,
            count = ids.len(),
            "Scheduled bulk messages"
        );
        Ok(ids)
    }

    fn snapshot(
        account_id: &str,
        contact: &Contact,
        body: &str,
        images: &[zapflow_storage::models::ImageAttachment],
        scheduled_at: DateTime<Utc>,
    ) -> CreateScheduledMessage {
        CreateScheduledMessage {
            account_id: account_id.to_string(),
            contact_id: Some(contact.id),
            recipient_name: contact.name.clone(),
            recipient_surname: contact.surname.clone(),
            recipient_phone: contact.phone.clone(),
            recipient_email: contact.email.clone(),
            recipient_birthday: contact.birthday,
            body: body.to_string(),
            images: Some(images.to_vec()),
            extra_vars: None,
            scheduled_at: Some(scheduled_at),
            status: MessageStatus::Scheduled,
            message_number: None,
            trigger_key: None,
            follow_up_delay_secs: None,
        }
    }

    /// Cancel a queued message. Legal only before dispatch; anything else
    /// is a state conflict, reported rather than silently ignored.
    pub async fn cancel(&self, id: MessageId) -> Result<ScheduledMessage, OutreachError> {
        match self.messages.cancel(id).await? {
            Some(message) => {
                self.events.publish(StatusEvent {
                    message_id: message.id,
                    account_id: message.account_id.clone(),
                    status: MessageStatus::Cancelled,
                    occurred_at: Utc::now(),
                });
                Ok(message)
            }
            None => match self.messages.get(id).await? {
                None => Err(OutreachError::NotFound("message".to_string())),
                Some(message) => Err(OutreachError::StateConflict(format!(
                    "cannot cancel message in status {}",
                    message.status
                ))),
            },
        }
    }

    /// Delete a message. In-flight rows are refused.
    pub async fn delete(&self, id: MessageId) -> Result<(), OutreachError> {
        if self.messages.delete(id).await? {
            return Ok(());
        }
        match self.messages.get(id).await? {
            None => Err(OutreachError::NotFound("message".to_string())),
            Some(message) => Err(OutreachError::StateConflict(format!(
                "cannot delete message in status {}",
                message.status
            ))),
        }
    }
}

/// Whether `now` falls inside the account's working-hour window.
///
/// The window is `[work_start, work_end)` evaluated in the account's
/// timezone. A window whose start is after its end spans midnight. A
/// malformed timezone or time keeps the window shut: messages wait,
/// nothing is dropped.
pub fn within_working_hours(settings: &SenderSettings, now: DateTime<Utc>) -> bool {
    let tz: Tz = match settings.timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(
                account = %settings.account_id,
                timezone = %settings.timezone,
                "Unknown timezone in sender settings"
            );
            return false;
        }
    };

    let (Some(start), Some(end)) = (
        parse_hhmm(&settings.work_start),
        parse_hhmm(&settings.work_end),
    ) else {
        warn!(
            account = %settings.account_id,
            "Malformed working-hour window in sender settings"
        );
        return false;
    };

    let local = now.with_timezone(&tz).time();

    if start < end {
        local >= start && local < end
    } else if start > end {
        // Window spans midnight
        local >= start || local < end
    } else {
        false
    }
}

fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}
