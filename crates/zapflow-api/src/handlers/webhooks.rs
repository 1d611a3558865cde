//! Provider webhook handlers
//!
//! Delivery acknowledgements arrive here as HTTP callbacks and are fed to
//! the delivery tracker through its channel. The webhook replies before
//! the event is processed; the tracker owns ordering and validation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use zapflow_common::types::{DeliveryEvent, DeliveryState};

use super::{validation_error, ApiError};
use crate::AppState;

/// One delivery acknowledgement from the provider
#[derive(Debug, Deserialize)]
pub struct DeliveryCallback {
    pub provider_message_id: String,
    pub state: DeliveryState,
    /// Defaults to receipt time when the provider sends none
    pub timestamp: Option<DateTime<Utc>>,
}

/// POST /api/v1/webhooks/delivery
pub async fn delivery_callback(
    State(state): State<Arc<AppState>>,
    Json(input): Json<DeliveryCallback>,
) -> Result<StatusCode, ApiError> {
    if input.provider_message_id.trim().is_empty() {
        return Err(validation_error("provider_message_id is required"));
    }

    let event = DeliveryEvent {
        provider_message_id: input.provider_message_id,
        state: input.state,
        timestamp: input.timestamp.unwrap_or_else(Utc::now),
    };

    if state.delivery_tx.send(event).await.is_err() {
        // Tracker gone means the process is shutting down; the provider
        // will redeliver
        warn!("Delivery tracker channel closed, dropping callback");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(super::ErrorResponse {
                error: "unavailable".to_string(),
                message: "Delivery tracking is shutting down".to_string(),
            }),
        ));
    }

    Ok(StatusCode::ACCEPTED)
}
