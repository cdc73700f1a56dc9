//! Readiness probe: succeeds only while the worker is running.

use axum::{extract::State, http::StatusCode, Json};

use crate::report::HealthReport;
use crate::state::AppState;

/// Readiness handler.
///
/// Returns the full report either way so a failing probe carries the worker's
/// recorded error.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.report();
    let status = if report.ready {
        StatusCode::OK
    } else {
        tracing::debug!(state = %report.worker.state, "Not ready");
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
