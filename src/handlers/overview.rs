//! `Summary`, `Complexity`, and `HighCardinalityKeys` read contracts
//! (spec §6).

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::AppState;

pub async fn summary(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.summary())
}

pub async fn complexity(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.complexity())
}

#[derive(Debug, Clone, Deserialize)]
pub struct HighCardinalityParams {
    pub threshold: Option<u64>,
}

pub async fn high_cardinality_keys(
    State(state): State<AppState>,
    Query(params): Query<HighCardinalityParams>,
) -> impl IntoResponse {
    let threshold = params.threshold.unwrap_or(state.config.high_cardinality_threshold);
    Json(state.store.high_cardinality_keys(threshold))
}
