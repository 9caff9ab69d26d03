//! `otlp_cardinality_core`: the in-memory OTLP cardinality and metadata
//! aggregation engine (spec §1). The library owns the concurrent store,
//! analyzers, serializer, session subsystem, and diff engine; the
//! `otlp-cardinality-service` binary (`main.rs`) is a thin wrapper that
//! mounts an HTTP surface around it.

pub mod aggregates;
pub mod analyzers;
pub mod config;
pub mod diff;
pub mod error;
pub mod handlers;
pub mod hll;
pub mod key_metadata;
pub mod otlp_model;
pub mod receivers;
pub mod serializer;
pub mod session;
pub mod store;
pub mod template;

use std::sync::Arc;

use config::CardinalityConfig;
use session::SessionStore;
use store::Store;

/// Shared application state, handed to every axum handler. Mirrors the
/// teacher's `AppState` (a small `Clone`-able bundle of `Arc`-wrapped
/// shared services) but fronts the in-memory `Store` instead of a
/// ClickHouse client.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub sessions: Arc<SessionStore>,
    pub config: Arc<CardinalityConfig>,
}

impl AppState {
    pub fn new(config: CardinalityConfig) -> anyhow::Result<Self> {
        let store = Arc::new(Store::new(&config)?);
        let sessions = Arc::new(SessionStore::new(
            &config.session.dir,
            config.session.max_sessions,
            config.session.max_session_size_bytes,
        )?);
        Ok(Self {
            store,
            sessions,
            config: Arc::new(config),
        })
    }
}

/// Assemble the full router: ingestion routes (E4) plus the read API
/// (E5), with the teacher's exact middleware stack (permissive CORS +
/// `TraceLayer`).
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    Router::new()
        // Ingestion (E4)
        .route("/v1/metrics", post(receivers::otlp_http::ingest_metrics))
        .route("/v1/traces", post(receivers::otlp_http::ingest_traces))
        .route("/v1/logs", post(receivers::otlp_http::ingest_logs))
        // Read API (E5)
        .route(
            "/api/v1/metrics",
            get(handlers::metrics::list_metrics),
        )
        .route(
            "/api/v1/metrics/{name}",
            get(handlers::metrics::get_metric),
        )
        .route("/api/v1/spans", get(handlers::spans::list_spans))
        .route("/api/v1/spans/{name}", get(handlers::spans::get_span))
        .route("/api/v1/logs", get(handlers::logs::list_logs))
        .route("/api/v1/logs/{severity}", get(handlers::logs::get_log))
        .route(
            "/api/v1/attributes",
            get(handlers::attributes::list_attributes),
        )
        .route(
            "/api/v1/attributes/{name}",
            get(handlers::attributes::get_attribute),
        )
        .route("/api/v1/summary", get(handlers::overview::summary))
        .route("/api/v1/complexity", get(handlers::overview::complexity))
        .route(
            "/api/v1/high-cardinality",
            get(handlers::overview::high_cardinality_keys),
        )
        // Sessions (E5)
        .route(
            "/api/v1/sessions",
            get(handlers::sessions::list_sessions).post(handlers::sessions::create_session),
        )
        .route(
            "/api/v1/sessions/diff",
            get(handlers::sessions::diff_sessions),
        )
        .route(
            "/api/v1/sessions/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route(
            "/api/v1/sessions/{id}/metadata",
            get(handlers::sessions::get_session_metadata),
        )
        .route(
            "/api/v1/sessions/{id}/load",
            post(handlers::sessions::load_session),
        )
        .route("/healthz", get(handlers::health::healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
