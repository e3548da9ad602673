//! The read-only HTTP surface: `/health`, `/metrics`, `/stats`. A
//! state-carrying `axum::Router` with `TraceLayer` and `CorsLayer`,
//! exposing just the three observability endpoints this cache needs.

mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use handlers::{health, metrics, stats};

/// Builds the HTTP router over the shared [`AppState`].
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/stats", get(stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
