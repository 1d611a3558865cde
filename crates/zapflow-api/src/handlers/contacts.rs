//! Contact handlers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use zapflow_common::types::{Paginated, PhoneNumber};
use zapflow_core::{ImportOutcome, ImportRecord};
use zapflow_storage::models::{Contact, ContactSource, CreateContact, UpdateContact};
use zapflow_storage::repository::ContactRepository;

use super::{db_error, default_limit, not_found, outreach_error, validation_error, ApiError};
use crate::AppState;

/// Query parameters for listing contacts
#[derive(Debug, Deserialize)]
pub struct ListContactsQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// Request body for creating a contact
#[derive(Debug, Deserialize)]
pub struct CreateContactRequest {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub phone: String,
}

/// Request body for updating a contact
#[derive(Debug, Deserialize)]
pub struct UpdateContactRequest {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub phone: Option<String>,
}

/// Request body for bulk deletion
#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct ContactIdsResponse {
    pub ids: Vec<Uuid>,
}

/// Request body for importing contacts
#[derive(Debug, Deserialize)]
pub struct ImportContactsRequest {
    pub records: Vec<ImportRecord>,
}

fn repo(state: &AppState) -> ContactRepository {
    ContactRepository::new(state.db_pool.pool().clone())
}

/// GET /api/v1/contacts
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListContactsQuery>,
) -> Result<Json<Paginated<Contact>>, ApiError> {
    let repo = repo(&state);

    let data = repo
        .search(&query.q, query.limit, query.offset)
        .await
        .map_err(db_error)?;
    let total = repo.count_search(&query.q).await.map_err(db_error)?;

    Ok(Json(Paginated {
        data,
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// GET /api/v1/contacts/ids - every id matching the filter, for
/// select-all-across-pages
pub async fn contact_ids(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListContactsQuery>,
) -> Result<Json<ContactIdsResponse>, ApiError> {
    let ids = repo(&state).search_ids(&query.q).await.map_err(db_error)?;
    Ok(Json(ContactIdsResponse { ids }))
}

/// POST /api/v1/contacts
pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateContactRequest>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    let phone = PhoneNumber::normalize(&input.phone)
        .ok_or_else(|| validation_error("phone number is required"))?;

    let contact = repo(&state)
        .create(CreateContact {
            name: input.name,
            surname: input.surname,
            email: input.email,
            birthday: input.birthday,
            phone: phone.into_string(),
            source: ContactSource::Manual,
        })
        .await
        .map_err(db_error)?;

    Ok((StatusCode::CREATED, Json(contact)))
}

/// GET /api/v1/contacts/:id
pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Contact>, ApiError> {
    repo(&state)
        .get(id)
        .await
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| not_found("Contact"))
}

/// PUT /api/v1/contacts/:id
pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateContactRequest>,
) -> Result<Json<Contact>, ApiError> {
    let phone = match input.phone.as_deref() {
        Some(raw) => Some(
            PhoneNumber::normalize(raw)
                .ok_or_else(|| validation_error("phone number is required"))?
                .into_string(),
        ),
        None => None,
    };

    repo(&state)
        .update(
            id,
            UpdateContact {
                name: input.name,
                surname: input.surname,
                email: input.email,
                birthday: input.birthday,
                phone,
            },
        )
        .await
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| not_found("Contact"))
}

/// DELETE /api/v1/contacts/:id
pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = repo(&state).delete(id).await.map_err(db_error)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Contact"))
    }
}

/// POST /api/v1/contacts/bulk-delete
pub async fn bulk_delete_contacts(
    State(state): State<Arc<AppState>>,
    Json(input): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    let deleted = repo(&state)
        .delete_many(&input.ids)
        .await
        .map_err(db_error)?;

    info!(deleted, "Bulk-deleted contacts");
    Ok(Json(BulkDeleteResponse { deleted }))
}

/// POST /api/v1/contacts/import
///
/// Accepts already-parsed records; file parsing happens in the UI layer.
pub async fn import_contacts(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ImportContactsRequest>,
) -> Result<Json<ImportOutcome>, ApiError> {
    if input.records.is_empty() {
        return Err(validation_error("no records provided"));
    }

    let outcome = state
        .importer
        .import(input.records)
        .await
        .map_err(outreach_error)?;

    Ok(Json(outcome))
}
