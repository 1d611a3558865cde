//! Repository layer for data access

pub mod contacts;
pub mod drip;
pub mod scheduled_messages;
pub mod sender_settings;
pub mod templates;

pub use contacts::ContactRepository;
pub use drip::DripRepository;
pub use scheduled_messages::{MessageNumberCounts, ScheduledMessageRepository};
pub use sender_settings::SenderSettingsRepository;
pub use templates::TemplateRepository;
