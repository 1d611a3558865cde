//! ZapFlow API - REST surface consumed by the UI layer
//!
//! All operations are request/response over HTTP. Store and core errors
//! are converted into typed `{error, message}` payloads at this boundary;
//! nothing below it leaks raw failures to the UI.

pub mod handlers;
pub mod routes;

use tokio::sync::mpsc;
use zapflow_common::types::DeliveryEvent;
use zapflow_core::{ContactImporter, DripEngine, SchedulingEngine};
use zapflow_storage::DatabasePool;

pub use routes::create_router;

/// Shared state handed to every handler
pub struct AppState {
    pub db_pool: DatabasePool,
    pub engine: SchedulingEngine,
    pub drip_engine: DripEngine,
    pub importer: ContactImporter,
    /// Feeds the delivery tracker with provider acknowledgements
    pub delivery_tx: mpsc::Sender<DeliveryEvent>,
}
