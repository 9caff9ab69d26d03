//! Thin OTLP/HTTP (JSON-encoded) ingestion adapter (E4, SPEC_FULL.md
//! §4 E4). Decodes the OTLP/HTTP JSON export-request shape into
//! `otlp_model` batches and folds each record through the matching
//! analyzer and into the store. Gzip request bodies are not handled
//! here (left to `tower_http::decompression`, not wired in since the
//! teacher doesn't use it) — this is intentionally the thinnest
//! adapter, matching the spec's framing of receivers as adapters that
//! "gain little from a rewrite". gRPC OTLP ingestion is not
//! implemented; see DESIGN.md.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::analyzers::{logs, metrics, traces};
use crate::error::CoreError;
use crate::otlp_model::{LogsBatch, MetricsBatch, TracesBatch};
use crate::AppState;

pub async fn ingest_metrics(State(state): State<AppState>, Json(batch): Json<MetricsBatch>) -> Result<StatusCode, CoreError> {
    let cancel = CancellationToken::new();
    let updates = metrics::analyze(&batch, &cancel)?;
    for update in &updates {
        state.store.store_metric(update, &cancel)?;
    }
    Ok(StatusCode::ACCEPTED)
}

pub async fn ingest_traces(State(state): State<AppState>, Json(batch): Json<TracesBatch>) -> Result<StatusCode, CoreError> {
    let cancel = CancellationToken::new();
    let updates = traces::analyze(&batch, &cancel)?;
    for update in &updates {
        state.store.store_span(update, &cancel)?;
    }
    Ok(StatusCode::ACCEPTED)
}

pub async fn ingest_logs(State(state): State<AppState>, Json(batch): Json<LogsBatch>) -> Result<StatusCode, CoreError> {
    let cancel = CancellationToken::new();
    let updates = logs::analyze(&batch, &cancel)?;
    for update in &updates {
        state.store.store_log(update, &cancel)?;
    }
    Ok(StatusCode::ACCEPTED)
}
