//! ZapFlow Core - Scheduling, dispatch, and delivery tracking
//!
//! This crate provides the outreach core for ZapFlow: the transport
//! capability boundary, the scheduling engine, the dispatch loop, the
//! delivery status tracker, the drip rule engine, and contact import.

pub mod events;
pub mod outreach;
pub mod ticker;
pub mod transport;

pub use events::{EventBus, StatusEvent};
pub use outreach::dispatcher::Dispatcher;
pub use outreach::drip::{DripEngine, SaleEvent};
pub use outreach::engine::SchedulingEngine;
pub use outreach::import::{ContactImporter, ImportOutcome, ImportRecord, SkippedRecord};
pub use outreach::tracker::DeliveryTracker;
pub use outreach::OutreachError;
pub use ticker::Ticker;
pub use transport::{CloudApiTransport, CloudConfig, ConnectionRegistry, Transport, TransportError};
