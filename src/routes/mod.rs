//! HTTP route handlers for the probe surface.
//!
//! Every route reads the latest worker snapshot and nothing else, and every
//! response carries `Cache-Control: no-store` so intermediaries never serve a
//! stale probe result.
//!
//! Request tracing is enabled via middleware that generates a unique request ID
//! for each incoming request, allowing correlation of all logs within a request.

pub mod health;
pub mod ready;
pub mod status;

use axum::{http::Uri, middleware, routing::get, Router};
use http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::CACHE_CONTROL_PROBE;
use crate::error::AppError;
use crate::middleware::request_id_layer;
use crate::state::AppState;

/// Fallback for unknown paths
async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}

/// Creates the Axum router with all probe routes.
pub fn create_router(state: AppState) -> Router {
    let probe_routes = Router::new()
        .route("/health", get(health::health))
        .route("/healthz", get(health::healthz))
        .route("/ready", get(ready::ready))
        .route("/status", get(status::status))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_PROBE),
        ));

    Router::new()
        .merge(probe_routes)
        .fallback(not_found)
        .with_state(state)
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}
