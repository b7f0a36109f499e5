//! `blockindex api`: serve the read API.

use std::sync::Arc;

use anyhow::{Context, Result};
use blockindex_api::{serve, AppState};
use blockindex_core::BlockIndexMetrics;
use blockindex_storage::PostgresStorage;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Settings;

pub async fn run(settings: &Settings, cancel: CancellationToken) -> Result<()> {
    let addr = settings.api_socket_addr()?;
    let storage = PostgresStorage::connect(&settings.postgres_url, settings.postgres_options())
        .await
        .context("connect to postgres")?;
    storage.ensure_schema().await.context("ensure schema")?;

    let state = AppState::new(Arc::new(storage), Arc::new(BlockIndexMetrics::global()));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    serve(listener, state, cancel).await.context("api server")?;

    info!("api shut down");
    Ok(())
}
