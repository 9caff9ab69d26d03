//! Service wiring (E6, SPEC_FULL.md §4 E6): load config, build the
//! `Store` + `SessionStore`, mount the router, serve.

use tracing_subscriber::EnvFilter;

use otlp_cardinality_core::config::CardinalityConfig;
use otlp_cardinality_core::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("otlp_cardinality_core=debug,tower_http=debug")),
        )
        .init();

    let config_path = std::env::var("CARDINALITY_CONFIG").unwrap_or_else(|_| "cardinality.toml".to_string());
    let config = CardinalityConfig::load(&config_path)?;

    let state = AppState::new(config)?;
    tracing::info!(session_dir = %state.config.session.dir, "session store ready");

    let app = build_router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("otlp-cardinality-service listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
