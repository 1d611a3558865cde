//! API routes

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{contacts, drip, health, messages, settings, templates, webhooks};
use crate::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health check routes
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness));

    // Contact routes
    let contact_routes = Router::new()
        .route("/", get(contacts::list_contacts))
        .route("/", post(contacts::create_contact))
        .route("/ids", get(contacts::contact_ids))
        .route("/import", post(contacts::import_contacts))
        .route("/bulk-delete", post(contacts::bulk_delete_contacts))
        .route("/:id", get(contacts::get_contact))
        .route("/:id", put(contacts::update_contact))
        .route("/:id", delete(contacts::delete_contact));

    // Template routes
    let template_routes = Router::new()
        .route("/", get(templates::list_templates))
        .route("/", post(templates::create_template))
        .route("/:id", get(templates::get_template))
        .route("/:id", put(templates::update_template))
        .route("/:id", delete(templates::delete_template));

    // Scheduled message routes
    let message_routes = Router::new()
        .route("/", get(messages::list_messages))
        .route("/schedule", post(messages::schedule_messages))
        .route("/cancel", post(messages::cancel_messages))
        .route("/bulk-delete", post(messages::bulk_delete_messages))
        .route("/stats", get(messages::message_stats))
        .route("/:id", get(messages::get_message))
        .route("/:id", delete(messages::delete_message))
        .route("/:id/cancel", post(messages::cancel_message));

    // Account settings routes
    let account_routes = Router::new()
        .route("/:id/settings", get(settings::get_sender_settings))
        .route("/:id/settings", put(settings::update_sender_settings))
        .route("/:id", delete(settings::delete_account));

    // Drip rule routes
    let drip_routes = Router::new()
        .route("/settings", get(drip::get_drip_settings))
        .route("/settings", put(drip::update_drip_settings))
        .route("/triggers", post(drip::ingest_trigger))
        .route("/triggers", get(drip::list_triggers));

    // Provider webhook routes
    let webhook_routes = Router::new().route("/delivery", post(webhooks::delivery_callback));

    let api_v1 = Router::new()
        .nest("/contacts", contact_routes)
        .nest("/templates", template_routes)
        .nest("/messages", message_routes)
        .nest("/accounts", account_routes)
        .nest("/drip", drip_routes)
        .nest("/webhooks", webhook_routes);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
