//! Application builder: router plus HTTP middleware.

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::middleware::cors::build_cors_layer;
use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors_origins);
    build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
