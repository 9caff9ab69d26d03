use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::CoreError;
use crate::handlers::ListParams;
use crate::AppState;

pub async fn list_spans(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    Json(state.store.list_spans(&params.into()))
}

pub async fn get_span(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    state
        .store
        .get_span_by_name(&name)
        .map(Json)
        .ok_or_else(|| CoreError::NotFound(format!("span {name} not found")))
}
