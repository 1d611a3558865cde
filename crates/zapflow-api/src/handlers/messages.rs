//! Scheduled message handlers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use zapflow_storage::models::{MessageStatus, ScheduledMessage, StatusHistoryEntry};
use zapflow_storage::repository::{MessageNumberCounts, ScheduledMessageRepository};

use super::{db_error, default_limit, not_found, outreach_error, validation_error, ApiError};
use crate::AppState;

/// Query parameters for listing messages
#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// Request body for scheduling messages
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub account_id: String,
    pub contact_ids: Vec<Uuid>,
    pub template_id: Uuid,
    /// Earliest eligible send instant; defaults to now
    pub not_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub scheduled: Vec<Uuid>,
}

/// Request body for bulk cancel / delete
#[derive(Debug, Deserialize)]
pub struct MessageIdsRequest {
    pub ids: Vec<Uuid>,
}

/// Per-id failure in a bulk operation
#[derive(Debug, Serialize)]
pub struct BulkItemError {
    pub id: Uuid,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BulkOutcome {
    pub affected: u64,
    pub errors: Vec<BulkItemError>,
}

/// A message with its full status history
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    #[serde(flatten)]
    pub message: ScheduledMessage,
    pub history: Vec<StatusHistoryEntry>,
}

/// Query parameters for statistics
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub by_status: zapflow_storage::models::MessageStatusCounts,
    pub by_message_number: MessageNumberCounts,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub data: Vec<MessageResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn repo(state: &AppState) -> ScheduledMessageRepository {
    ScheduledMessageRepository::new(state.db_pool.pool().clone())
}

/// POST /api/v1/messages/schedule
pub async fn schedule_messages(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleResponse>), ApiError> {
    if input.account_id.trim().is_empty() {
        return Err(validation_error("account_id is required"));
    }

    let scheduled = state
        .engine
        .schedule_bulk(
            &input.account_id,
            &input.contact_ids,
            input.template_id,
            input.not_before,
        )
        .await
        .map_err(outreach_error)?;

    Ok((StatusCode::CREATED, Json(ScheduleResponse { scheduled })))
}

/// GET /api/v1/messages
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            raw.parse::<MessageStatus>()
                .map_err(|_| validation_error(format!("unknown status filter: {}", raw)))?,
        ),
        None => None,
    };

    let repo = repo(&state);
    let messages = repo
        .list(status, query.limit, query.offset)
        .await
        .map_err(db_error)?;
    let total = repo.count(status).await.map_err(db_error)?;

    let mut data = Vec::with_capacity(messages.len());
    for message in messages {
        let history = repo.history(message.id).await.map_err(db_error)?;
        data.push(MessageResponse { message, history });
    }

    Ok(Json(MessageListResponse {
        data,
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// GET /api/v1/messages/:id
pub async fn get_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let repo = repo(&state);
    let message = repo
        .get(id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("Message"))?;
    let history = repo.history(id).await.map_err(db_error)?;

    Ok(Json(MessageResponse { message, history }))
}

/// POST /api/v1/messages/:id/cancel
pub async fn cancel_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScheduledMessage>, ApiError> {
    state
        .engine
        .cancel(id)
        .await
        .map(Json)
        .map_err(outreach_error)
}

/// POST /api/v1/messages/cancel
pub async fn cancel_messages(
    State(state): State<Arc<AppState>>,
    Json(input): Json<MessageIdsRequest>,
) -> Result<Json<BulkOutcome>, ApiError> {
    let mut affected = 0u64;
    let mut errors = Vec::new();

    for id in input.ids {
        match state.engine.cancel(id).await {
            Ok(_) => affected += 1,
            Err(e) => errors.push(BulkItemError {
                id,
                error: e.to_string(),
            }),
        }
    }

    info!(affected, failed = errors.len(), "Bulk cancel finished");
    Ok(Json(BulkOutcome { affected, errors }))
}

/// DELETE /api/v1/messages/:id
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete(id).await.map_err(outreach_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/messages/bulk-delete
pub async fn bulk_delete_messages(
    State(state): State<Arc<AppState>>,
    Json(input): Json<MessageIdsRequest>,
) -> Result<Json<BulkOutcome>, ApiError> {
    let mut affected = 0u64;
    let mut errors = Vec::new();

    for id in input.ids {
        match state.engine.delete(id).await {
            Ok(()) => affected += 1,
            Err(e) => errors.push(BulkItemError {
                id,
                error: e.to_string(),
            }),
        }
    }

    Ok(Json(BulkOutcome { affected, errors }))
}

/// GET /api/v1/messages/stats
pub async fn message_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let repo = repo(&state);

    let by_status = repo
        .counts_by_status(query.from, query.to)
        .await
        .map_err(db_error)?;
    let by_message_number = repo
        .counts_by_message_number(query.from, query.to)
        .await
        .map_err(db_error)?;
    let total = by_status.total();

    Ok(Json(StatsResponse {
        by_status,
        by_message_number,
        total,
    }))
}
