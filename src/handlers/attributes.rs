use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::CoreError;
use crate::handlers::ListParams;
use crate::AppState;

pub async fn list_attributes(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    Json(state.store.list_attributes(&params.into()))
}

pub async fn get_attribute(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    state
        .store
        .get_attribute_by_name(&name)
        .map(Json)
        .ok_or_else(|| CoreError::NotFound(format!("attribute {name} not found")))
}
