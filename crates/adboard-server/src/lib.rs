//! adboard server library logic.

pub mod api;
pub mod config;

use adboard_db::DbPool;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool. Handlers check out one connection per request.
    pub pool: DbPool,
}

/// Maximum request body size (64 KiB). Advertisement payloads are tiny.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/test/", post(api::create_advert_handler))
        .route(
            "/test/{id}",
            get(api::get_advert_handler)
                .patch(api::patch_advert_handler)
                .delete(api::delete_advert_handler),
        )
        .fallback(api::not_found_handler)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
