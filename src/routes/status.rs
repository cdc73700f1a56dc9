//! Full worker status for operators.

use axum::{extract::State, Json};

use crate::report::HealthReport;
use crate::state::AppState;

pub async fn status(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.report())
}
