//! Route definitions for the PitchForge HTTP API.
//!
//! All routes are mounted under `/api` and receive `AppState` through Axum's
//! `State` extractor.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

use crate::handlers;
use crate::state::AppState;

/// Largest accepted request body. Inline script uploads are base64 encoded.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Build the router with all routes.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(job_routes())
        .merge(ingestion_routes())
        .merge(admin_routes())
        .merge(queue_routes())
        .merge(health_routes());

    Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Trigger called by the interval scheduler
fn job_routes() -> Router<AppState> {
    Router::new().route("/jobs/process", post(handlers::jobs::process_jobs))
}

/// Ingestion submission and pipeline status
fn ingestion_routes() -> Router<AppState> {
    Router::new()
        .route("/ingestions", post(handlers::ingestion::create_ingestion))
        .route("/ingestions/{id}", get(handlers::ingestion::get_ingestion))
        .route("/ingestions/{id}/steps", get(handlers::ingestion::list_steps))
        .route(
            "/ingestions/{id}/package",
            get(handlers::ingestion::get_package),
        )
}

/// Dead-letter administration
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/admin/dead-letter",
            get(handlers::admin::list_dead_letter),
        )
        .route(
            "/admin/dead-letter/{id}",
            delete(handlers::admin::delete_dead_letter),
        )
        .route(
            "/admin/dead-letter/{id}/retry",
            post(handlers::admin::retry_dead_letter),
        )
        .route("/admin/actions", post(handlers::admin::admin_action))
}

/// Queue inspection and lock actions
fn queue_routes() -> Router<AppState> {
    Router::new()
        .route("/queue/status", get(handlers::queue::queue_status))
        .route("/queue/actions", post(handlers::queue::queue_action))
}

/// Health
fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}
