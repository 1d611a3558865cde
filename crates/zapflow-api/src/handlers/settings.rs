//! Sender settings handlers

use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveTime;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use zapflow_storage::models::{SenderSettings, UpdateSenderSettings};
use zapflow_storage::repository::SenderSettingsRepository;

use super::{db_error, validation_error, ApiError};
use crate::AppState;

/// Request body for updating sender settings
#[derive(Debug, Deserialize)]
pub struct UpdateSenderSettingsRequest {
    pub work_start: Option<String>,
    pub work_end: Option<String>,
    pub send_interval_secs: Option<i64>,
    pub enabled: Option<bool>,
    pub timezone: Option<String>,
}

fn repo(state: &AppState) -> SenderSettingsRepository {
    SenderSettingsRepository::new(state.db_pool.pool().clone())
}

fn validate_hhmm(label: &str, value: &str) -> Result<(), ApiError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map(|_| ())
        .map_err(|_| validation_error(format!("{} must be HH:MM, got {:?}", label, value)))
}

/// GET /api/v1/accounts/:id/settings
///
/// First read creates the defaults row for the account.
pub async fn get_sender_settings(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> Result<Json<SenderSettings>, ApiError> {
    repo(&state)
        .get_or_default(&account_id)
        .await
        .map(Json)
        .map_err(db_error)
}

/// PUT /api/v1/accounts/:id/settings
pub async fn update_sender_settings(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
    Json(input): Json<UpdateSenderSettingsRequest>,
) -> Result<Json<SenderSettings>, ApiError> {
    if let Some(start) = input.work_start.as_deref() {
        validate_hhmm("work_start", start)?;
    }
    if let Some(end) = input.work_end.as_deref() {
        validate_hhmm("work_end", end)?;
    }
    if let Some(tz) = input.timezone.as_deref() {
        tz.parse::<chrono_tz::Tz>()
            .map_err(|_| validation_error(format!("unknown timezone: {}", tz)))?;
    }
    if let Some(interval) = input.send_interval_secs {
        if interval < 0 {
            return Err(validation_error("send_interval_secs must be non-negative"));
        }
    }

    repo(&state)
        .update(
            &account_id,
            UpdateSenderSettings {
                work_start: input.work_start,
                work_end: input.work_end,
                send_interval_secs: input.send_interval_secs,
                enabled: input.enabled,
                timezone: input.timezone,
            },
        )
        .await
        .map(Json)
        .map_err(db_error)
}

/// DELETE /api/v1/accounts/:id
///
/// Removes the settings row and cascades to the account's messages and
/// their history.
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed_messages = repo(&state)
        .delete_account(&account_id)
        .await
        .map_err(db_error)?;

    info!(account = %account_id, removed_messages, "Account removed");
    Ok(Json(serde_json::json!({ "removed_messages": removed_messages })))
}
