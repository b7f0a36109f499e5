//! `blockindex indexer`: the ingestion loop plus the best-effort heads listener.

use std::sync::Arc;

use anyhow::{Context, Result};
use blockindex_core::{BlockIndexMetrics, IngestionScheduler};
use blockindex_rpc::{DagFetcher, EvmFetcher, HeadsListener, RpcHttpClient};
use blockindex_storage::PostgresStorage;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;

pub async fn run(settings: &Settings, cancel: CancellationToken) -> Result<()> {
    let config = settings.indexer_config();

    let storage = PostgresStorage::connect(&settings.postgres_url, settings.postgres_options())
        .await
        .context("connect to postgres")?;
    storage.ensure_schema().await.context("ensure schema")?;

    let evm = RpcHttpClient::new(&settings.chain_rpc_url, settings.evm_client_config())?;
    let dag = RpcHttpClient::new(&settings.dag_rpc_url, settings.dag_client_config())?;

    let mut scheduler = IngestionScheduler::new(
        config,
        Arc::new(EvmFetcher::new(evm)),
        Arc::new(DagFetcher::new(dag)),
        Arc::new(storage),
        Arc::new(BlockIndexMetrics::global()),
    );

    let heads = HeadsListener::new(settings.chain_ws_url.clone());
    let heads_cancel = cancel.child_token();
    let heads_task = tokio::spawn(async move { heads.run(heads_cancel).await });

    info!(
        evm_rpc = %settings.chain_rpc_url,
        dag_rpc = %settings.dag_rpc_url,
        poll_interval = ?settings.poll_interval,
        "indexer starting"
    );
    let result = scheduler.run(cancel.clone()).await;

    cancel.cancel();
    match heads_task.await {
        Ok(seen) => info!(heads = seen, "heads listener stopped"),
        Err(e) => warn!(error = %e, "heads listener task failed"),
    }
    info!(cursor = ?scheduler.cursor(), "indexer stopped");

    result.context("ingestion loop")
}
