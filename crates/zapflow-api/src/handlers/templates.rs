//! Template handlers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use zapflow_common::types::Paginated;
use zapflow_storage::models::{CreateTemplate, ImageAttachment, Template, UpdateTemplate};
use zapflow_storage::repository::TemplateRepository;

use super::{db_error, default_limit, not_found, validation_error, ApiError};
use crate::AppState;

/// Query parameters for listing templates
#[derive(Debug, Deserialize)]
pub struct ListTemplatesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// Request body for creating a template
#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub body: String,
    pub images: Option<Vec<ImageAttachment>>,
}

/// Request body for updating a template
#[derive(Debug, Deserialize)]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub body: Option<String>,
    pub images: Option<Vec<ImageAttachment>>,
}

fn repo(state: &AppState) -> TemplateRepository {
    TemplateRepository::new(state.db_pool.pool().clone())
}

/// GET /api/v1/templates
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTemplatesQuery>,
) -> Result<Json<Paginated<Template>>, ApiError> {
    let repo = repo(&state);
    let data = repo.list(query.limit, query.offset).await.map_err(db_error)?;
    let total = repo.count().await.map_err(db_error)?;

    Ok(Json(Paginated {
        data,
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// POST /api/v1/templates
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<Template>), ApiError> {
    if input.name.trim().is_empty() {
        return Err(validation_error("template name is required"));
    }
    if input.body.trim().is_empty() && input.images.as_deref().unwrap_or_default().is_empty() {
        return Err(validation_error("template needs a body or at least one image"));
    }

    let template = repo(&state)
        .create(CreateTemplate {
            name: input.name,
            body: input.body,
            images: input.images,
        })
        .await
        .map_err(db_error)?;

    Ok((StatusCode::CREATED, Json(template)))
}

/// GET /api/v1/templates/:id
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Template>, ApiError> {
    repo(&state)
        .get(id)
        .await
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| not_found("Template"))
}

/// PUT /api/v1/templates/:id
pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTemplateRequest>,
) -> Result<Json<Template>, ApiError> {
    repo(&state)
        .update(
            id,
            UpdateTemplate {
                name: input.name,
                body: input.body,
                images: input.images,
            },
        )
        .await
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| not_found("Template"))
}

/// DELETE /api/v1/templates/:id
pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = repo(&state).delete(id).await.map_err(db_error)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Template"))
    }
}
