//! Router configuration

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers;
use crate::AppState;

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        // Provider webhooks
        .route("/webhooks/call-status", post(handlers::call_status_webhook))
        .route("/webhooks/task", post(handlers::task_webhook))
        .route("/webhooks/amd", post(handlers::amd_webhook))
        .route("/webhooks/recording", post(handlers::recording_webhook))
        .route("/webhooks/dial", post(handlers::dial_webhook))
        // Call ledger
        .route("/api/v1/calls", get(handlers::list_calls))
        .route("/api/v1/calls/stats", get(handlers::call_stats))
        .route("/api/v1/calls/originate", post(handlers::originate_call))
        .route("/api/v1/calls/{id}", get(handlers::get_call))
        .route("/api/v1/calls/{id}/notes", put(handlers::update_notes))
        // Agent directory
        .route("/api/v1/agents", post(handlers::register_agent))
        .route("/api/v1/agents", get(handlers::list_agents))
        .with_state(state)
}
