//! Liveness endpoints for container orchestration.
//!
//! `/health` only proves the process answers HTTP and never looks at the worker.
//! `/healthz` also fails when the worker's heartbeat goes stale, so a platform
//! that restarts on failed liveness checks recycles a wedged worker.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::report::Verdict;
use crate::state::AppState;

/// Health check handler.
///
/// Returns a simple "ok" response to indicate the service is running.
/// This is a liveness probe - it only checks that the process can respond to HTTP.
pub async fn health() -> &'static str {
    "ok"
}

/// Heartbeat-aware liveness check.
///
/// 200 while the worker is booting within its grace period or heartbeating on
/// time, 503 once the heartbeat is stale or the worker has failed or stopped.
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.report();
    match report.status {
        Verdict::Ok => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Verdict::Booting => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "detail": report.detail })),
        ),
        Verdict::Unhealthy => {
            tracing::warn!(
                state = %report.worker.state,
                heartbeat_age_seconds = ?report.heartbeat_age_seconds,
                "Liveness check failed"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "detail": report.detail })),
            )
        }
    }
}
