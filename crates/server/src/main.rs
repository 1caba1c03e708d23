//! engraft server entry point.
//!
//! Boots the HTTP API over the SQLite-backed governance stores. Logging is
//! JSON on stderr, filtered by RUST_LOG.

use anyhow::Result;
use engraft_core::{AppConfig, StoreDb};
use tracing_subscriber::EnvFilter;

mod error;
mod handlers;
mod ops;
mod routes;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let db = StoreDb::open(&config.db_path).await?;
    let state = state::AppState::from_config(&config, db)?;

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("engraft listening on {}", config.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
