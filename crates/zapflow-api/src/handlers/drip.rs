//! Drip rule handlers

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use zapflow_common::types::DelayUnit;
use zapflow_storage::models::{DripSettings, DripTrigger, ImageAttachment, UpdateDripSettings};
use zapflow_storage::repository::DripRepository;

use super::{db_error, default_limit, outreach_error, validation_error, ApiError};
use crate::AppState;
use zapflow_core::SaleEvent;

/// Request body for updating drip settings
#[derive(Debug, Deserialize)]
pub struct UpdateDripSettingsRequest {
    pub enabled: Option<bool>,
    pub account_id: Option<String>,
    pub first_delay_value: Option<i64>,
    pub first_delay_unit: Option<String>,
    pub second_delay_value: Option<i64>,
    pub second_delay_unit: Option<String>,
    pub first_body: Option<String>,
    pub first_images: Option<Vec<ImageAttachment>>,
    pub second_body: Option<String>,
    pub second_images: Option<Vec<ImageAttachment>>,
}

/// Result of ingesting one sale trigger
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub materialized: bool,
    pub first_id: Option<Uuid>,
    pub second_id: Option<Uuid>,
}

/// Query parameters for listing processed triggers
#[derive(Debug, Deserialize)]
pub struct ListTriggersQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn repo(state: &AppState) -> DripRepository {
    DripRepository::new(state.db_pool.pool().clone())
}

fn validate_delay(label: &str, value: Option<i64>, unit: Option<&str>) -> Result<(), ApiError> {
    if let Some(value) = value {
        if value < 0 {
            return Err(validation_error(format!("{} must be non-negative", label)));
        }
    }
    if let Some(unit) = unit {
        unit.parse::<DelayUnit>()
            .map_err(|_| validation_error(format!("{} unit must be minutes/hours/days", label)))?;
    }
    Ok(())
}

/// GET /api/v1/drip/settings
pub async fn get_drip_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DripSettings>, ApiError> {
    repo(&state).get_or_default().await.map(Json).map_err(db_error)
}

/// PUT /api/v1/drip/settings
pub async fn update_drip_settings(
    State(state): State<Arc<AppState>>,
    Json(input): Json<UpdateDripSettingsRequest>,
) -> Result<Json<DripSettings>, ApiError> {
    validate_delay(
        "first delay",
        input.first_delay_value,
        input.first_delay_unit.as_deref(),
    )?;
    validate_delay(
        "second delay",
        input.second_delay_value,
        input.second_delay_unit.as_deref(),
    )?;

    repo(&state)
        .update(UpdateDripSettings {
            enabled: input.enabled,
            account_id: input.account_id,
            first_delay_value: input.first_delay_value,
            first_delay_unit: input.first_delay_unit,
            second_delay_value: input.second_delay_value,
            second_delay_unit: input.second_delay_unit,
            first_body: input.first_body,
            first_images: input.first_images,
            second_body: input.second_body,
            second_images: input.second_images,
        })
        .await
        .map(Json)
        .map_err(db_error)
}

/// POST /api/v1/drip/triggers
///
/// Ingests one qualifying sale event. Re-posting a document that was
/// already materialized is a no-op, reported as such.
pub async fn ingest_trigger(
    State(state): State<Arc<AppState>>,
    Json(sale): Json<SaleEvent>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    match state
        .drip_engine
        .process_trigger(sale)
        .await
        .map_err(outreach_error)?
    {
        Some((first_id, second_id)) => Ok((
            StatusCode::CREATED,
            Json(TriggerResponse {
                materialized: true,
                first_id: Some(first_id),
                second_id: Some(second_id),
            }),
        )),
        None => Ok((
            StatusCode::OK,
            Json(TriggerResponse {
                materialized: false,
                first_id: None,
                second_id: None,
            }),
        )),
    }
}

/// GET /api/v1/drip/triggers
pub async fn list_triggers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTriggersQuery>,
) -> Result<Json<Vec<DripTrigger>>, ApiError> {
    repo(&state)
        .list_triggers(query.limit, query.offset)
        .await
        .map(Json)
        .map_err(db_error)
}
