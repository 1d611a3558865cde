//! Common types for ZapFlow

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for message templates
pub type TemplateId = Uuid;

/// Unique identifier for scheduled messages
pub type MessageId = Uuid;

/// Identifier for a connected messaging account (session name or phone id)
pub type AccountId = String;

/// A phone number normalized to international digits, no symbols
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalize a raw phone string: keep digits only, drop everything else.
    /// Returns `None` if no digits remain.
    pub fn normalize(raw: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            None
        } else {
            Some(Self(digits))
        }
    }

    /// Get the normalized digits
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
            .ok_or_else(|| crate::Error::Validation("Phone number has no digits".to_string()))
    }
}

/// Delivery lifecycle state reported by the transport for a sent message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryState::Sent => write!(f, "sent"),
            DeliveryState::Delivered => write!(f, "delivered"),
            DeliveryState::Read => write!(f, "read"),
            DeliveryState::Failed => write!(f, "failed"),
        }
    }
}

/// Asynchronous delivery acknowledgement emitted by the transport,
/// keyed by the provider-assigned message identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub provider_message_id: String,
    pub state: DeliveryState,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Delay unit for drip rule configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    Minutes,
    Hours,
    Days,
}

impl DelayUnit {
    /// Convert a delay value in this unit to seconds
    pub fn to_seconds(self, value: i64) -> i64 {
        match self {
            DelayUnit::Minutes => value * 60,
            DelayUnit::Hours => value * 3600,
            DelayUnit::Days => value * 86400,
        }
    }
}

impl std::fmt::Display for DelayUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DelayUnit::Minutes => write!(f, "minutes"),
            DelayUnit::Hours => write!(f, "hours"),
            DelayUnit::Days => write!(f, "days"),
        }
    }
}

impl std::str::FromStr for DelayUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minutes" => Ok(DelayUnit::Minutes),
            "hours" => Ok(DelayUnit::Hours),
            "days" => Ok(DelayUnit::Days),
            _ => Err(format!("Invalid delay unit: {}", s)),
        }
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_normalize() {
        let phone = PhoneNumber::normalize("+54 (911) 5555-0001").unwrap();
        assert_eq!(phone.as_str(), "5491155550001");
    }

    #[test]
    fn test_phone_normalize_rejects_empty() {
        assert!(PhoneNumber::normalize("").is_none());
        assert!(PhoneNumber::normalize("n/a").is_none());
        assert!(PhoneNumber::normalize("+-() ").is_none());
    }

    #[test]
    fn test_delay_unit_seconds() {
        assert_eq!(DelayUnit::Minutes.to_seconds(5), 300);
        assert_eq!(DelayUnit::Hours.to_seconds(2), 7200);
        assert_eq!(DelayUnit::Days.to_seconds(1), 86400);
    }

    #[test]
    fn test_delay_unit_parse() {
        assert_eq!("hours".parse::<DelayUnit>().unwrap(), DelayUnit::Hours);
        assert!("weeks".parse::<DelayUnit>().is_err());
    }
}
