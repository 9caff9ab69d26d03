//! Session CRUD + diff read/write contracts (spec §4.7, §4.8, §4.9).
//!
//! `SessionStore` is synchronous (plain `std::fs`); handlers wrap it in
//! `tokio::task::spawn_blocking` so a slow disk never stalls the async
//! runtime, the same pattern the teacher uses for its own blocking
//! config-reload path.

use std::collections::HashSet;
use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::diff::{self, Severity};
use crate::error::CoreError;
use crate::serializer::{self, CreateSessionOptions, SignalKind};
use crate::AppState;

fn parse_signal(name: &str) -> Result<SignalKind, CoreError> {
    match name {
        "metrics" => Ok(SignalKind::Metrics),
        "spans" => Ok(SignalKind::Spans),
        "logs" => Ok(SignalKind::Logs),
        "attributes" => Ok(SignalKind::Attributes),
        other => Err(CoreError::Validation(format!("unknown signal type: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub signals: Vec<String>,
    #[serde(default)]
    pub services: Option<Vec<String>>,
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let mut signals = HashSet::new();
    for raw in &req.signals {
        signals.insert(parse_signal(raw)?);
    }
    if signals.is_empty() {
        return Err(CoreError::Validation("signals must be non-empty".to_string()));
    }

    let opts = CreateSessionOptions {
        id: req.id,
        description: req.description,
        signals,
        services: req.services,
    };
    let session = serializer::create_session(&opts, &state.store);

    let sessions = state.sessions.clone();
    let to_save = session.clone();
    tokio::task::spawn_blocking(move || sessions.save(&to_save, &CancellationToken::new()))
        .await
        .map_err(|e| CoreError::Io(std::io::Error::other(e)))??;

    Ok(Json(session))
}

pub async fn list_sessions(State(state): State<AppState>) -> Result<impl IntoResponse, CoreError> {
    let sessions = state.sessions.clone();
    let list = tokio::task::spawn_blocking(move || sessions.list())
        .await
        .map_err(|e| CoreError::Io(std::io::Error::other(e)))??;
    Ok(Json(list))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let sessions = state.sessions.clone();
    let session = tokio::task::spawn_blocking(move || sessions.load(&id))
        .await
        .map_err(|e| CoreError::Io(std::io::Error::other(e)))??;
    Ok(Json(session))
}

pub async fn get_session_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let sessions = state.sessions.clone();
    let metadata = tokio::task::spawn_blocking(move || sessions.get_metadata(&id))
        .await
        .map_err(|e| CoreError::Io(std::io::Error::other(e)))??;
    Ok(Json(metadata))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let sessions = state.sessions.clone();
    tokio::task::spawn_blocking(move || sessions.delete(&id))
        .await
        .map_err(|e| CoreError::Io(std::io::Error::other(e)))??;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct LoadParams {
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "replace".to_string()
}

/// `Replace` or `Merge` load semantics, spec §4.8: `?mode=replace|merge`.
pub async fn load_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<LoadParams>,
) -> Result<impl IntoResponse, CoreError> {
    let sessions = state.sessions.clone();
    let session = tokio::task::spawn_blocking(move || sessions.load(&id))
        .await
        .map_err(|e| CoreError::Io(std::io::Error::other(e)))??;

    let empty_metrics = Vec::new();
    let empty_spans = Vec::new();
    let empty_logs = Vec::new();
    let empty_attrs = Vec::new();
    let metrics = session.data.metrics.as_ref().unwrap_or(&empty_metrics);
    let spans = session.data.spans.as_ref().unwrap_or(&empty_spans);
    let logs = session.data.logs.as_ref().unwrap_or(&empty_logs);
    let attributes = session.data.attributes.as_ref().unwrap_or(&empty_attrs);

    match params.mode.as_str() {
        "replace" => state.store.replace_from_serialized(metrics, spans, logs, attributes)?,
        "merge" => state.store.merge_from_serialized(metrics, spans, logs, attributes)?,
        other => return Err(CoreError::Validation(format!("unknown load mode: {other}"))),
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct DiffParams {
    pub from: String,
    pub to: String,
    pub min_severity: Option<String>,
}

pub async fn diff_sessions(
    State(state): State<AppState>,
    Query(params): Query<DiffParams>,
) -> Result<impl IntoResponse, CoreError> {
    let sessions = state.sessions.clone();
    let from_id = params.from.clone();
    let to_id = params.to.clone();
    let (from, to) = tokio::task::spawn_blocking(move || -> Result<_, CoreError> {
        let from = sessions.load(&from_id)?;
        let to = sessions.load(&to_id)?;
        Ok((from, to))
    })
    .await
    .map_err(|e| CoreError::Io(std::io::Error::other(e)))??;

    let mut result = diff::diff_snapshots(&from, &to, state.config.high_cardinality_threshold);
    if let Some(raw) = params.min_severity {
        let min = Severity::from_str(&raw)?;
        diff::filter_min_severity(&mut result, min);
    }
    Ok(Json(result))
}
