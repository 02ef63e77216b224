//! HTTP serving layer and background refresh for the metadata aggregator.

pub mod api;
pub mod background;
pub mod config;

use axum::{routing::get, Extension, Json, Router};
use fedagg_core::AggregatorRegistry;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Every configured feed, constructed per request.
    pub registry: Arc<AggregatorRegistry>,
}

/// Health check handler.
///
/// Returns `200 OK` with server status and version.
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
        .route("/get", get(api::get_metadata_handler))
        .route("/aggregators", get(api::list_aggregators_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
