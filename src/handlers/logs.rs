use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::CoreError;
use crate::handlers::ListParams;
use crate::AppState;

pub async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    Json(state.store.list_logs(&params.into()))
}

/// Keyed by severity text (spec §3 "LogMetadata"), normalized uppercase
/// on ingest — callers may pass any case, we normalize before lookup.
pub async fn get_log(
    State(state): State<AppState>,
    Path(severity): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let severity = crate::aggregates::log::normalize_severity(Some(&severity));
    state
        .store
        .get_log_by_name(&severity)
        .map(Json)
        .ok_or_else(|| CoreError::NotFound(format!("log severity {severity} not found")))
}
