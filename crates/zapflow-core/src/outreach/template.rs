//! Template rendering - placeholder substitution for message bodies
//!
//! Substitution happens at send time, not schedule time: the date/time
//! tokens reflect the actual send instant in the account's timezone, and
//! the recipient tokens come from the snapshot frozen on the message row.

use chrono::{DateTime, Datelike, Timelike};
use chrono_tz::Tz;
use regex::Regex;
use serde_json::Value;
use zapflow_storage::models::ScheduledMessage;

/// Render a message body against its recipient snapshot and the send instant
pub fn render(message: &ScheduledMessage, now: DateTime<Tz>) -> String {
    let mut result = message.body.clone();

    result = result.replace("{name}", message.recipient_name.as_deref().unwrap_or(""));
    result = result.replace(
        "{surname}",
        message.recipient_surname.as_deref().unwrap_or(""),
    );
    result = result.replace("{phone}", &message.recipient_phone);
    result = result.replace("{email}", message.recipient_email.as_deref().unwrap_or(""));

    let birthday = message
        .recipient_birthday
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_default();
    result = result.replace("{birthday}", &birthday);

    result = result.replace("{date}", &now.format("%d/%m/%Y").to_string());
    result = result.replace("{time}", &now.format("%H:%M").to_string());
    result = result.replace("{datetime}", &now.format("%d/%m/%Y %H:%M").to_string());
    result = result.replace("{day}", &format!("{:02}", now.day()));
    result = result.replace("{month}", &format!("{:02}", now.month()));
    result = result.replace("{year}", &now.year().to_string());

    // Trigger-derived variables (e.g. {document}, {amount} on drip messages)
    if let Some(extras) = message.extra_vars.as_object() {
        for (key, value) in extras {
            let token = format!("{{{}}}", key);
            let value_str = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                _ => value.to_string(),
            };
            result = result.replace(&token, &value_str);
        }
    }

    strip_unresolved(&result)
}

/// Remove tokens that had no value so the customer never sees them
fn strip_unresolved(content: &str) -> String {
    let re = Regex::new(r"\{[a-z_]+\}").unwrap();
    re.replace_all(content, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn test_message(body: &str) -> ScheduledMessage {
        ScheduledMessage {
            id: uuid::Uuid::new_v4(),
            account_id: "main".to_string(),
            contact_id: None,
            recipient_name: Some("Maria".to_string()),
            recipient_surname: Some("Gomez".to_string()),
            recipient_phone: "5491155550001".to_string(),
            recipient_email: Some("maria@example.com".to_string()),
            recipient_birthday: NaiveDate::from_ymd_opt(1990, 4, 12),
            body: body.to_string(),
            images: serde_json::json!([]),
            extra_vars: serde_json::json!({"document": "A-0001", "amount": 120.5}),
            scheduled_at: Some(Utc::now()),
            status: "scheduled".to_string(),
            message_number: None,
            trigger_key: None,
            follow_up_delay_secs: None,
            provider_message_id: None,
            failure_reason: None,
            sent_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn send_instant() -> DateTime<Tz> {
        chrono_tz::UTC.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_recipient_tokens() {
        let message = test_message("Hola {name} {surname}, tel {phone}");
        assert_eq!(
            render(&message, send_instant()),
            "Hola Maria Gomez, tel 5491155550001"
        );
    }

    #[test]
    fn test_date_tokens_reflect_send_instant() {
        let message = test_message("{date} {time} {datetime} {day}/{month}/{year}");
        assert_eq!(
            render(&message, send_instant()),
            "05/03/2024 14:30 05/03/2024 14:30 05/03/2024"
        );
    }

    #[test]
    fn test_birthday_token() {
        let message = test_message("Feliz cumple el {birthday}!");
        assert_eq!(render(&message, send_instant()), "Feliz cumple el 12/04/1990!");
    }

    #[test]
    fn test_trigger_extras() {
        let message = test_message("Compra {document} por ${amount}");
        assert_eq!(render(&message, send_instant()), "Compra A-0001 por $120.5");
    }

    #[test]
    fn test_unresolved_tokens_stripped() {
        let mut message = test_message("Hola {name}, {unknown_token} chau");
        message.recipient_name = None;
        assert_eq!(render(&message, send_instant()), "Hola ,  chau");
    }
}
