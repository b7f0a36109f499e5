//! BlockIndex CLI.
//!
//! # Commands
//! ```text
//! blockindex indexer   ingest EVM + DAG blocks until SIGINT/SIGTERM
//! blockindex api       serve the read API until SIGINT/SIGTERM
//! blockindex schema    create missing tables and partitions, then exit
//! blockindex info      print the effective configuration
//! ```
//!
//! Every flag falls back to an environment variable (`POSTGRES_URL`,
//! `CHAIN_RPC_URL`, `DAG_RPC_URL`, `POLL_INTERVAL`, ...).

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

mod cmd_api;
mod cmd_indexer;
mod cmd_schema;
mod config;
mod logging;

use config::Settings;

#[derive(Parser)]
#[command(
    name = "blockindex",
    about = "Dual-source block indexer: EVM + DAG ingestion into partitioned PostgreSQL",
    version
)]
struct Cli {
    /// Log filter when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Emit JSON logs (default in production)
    #[arg(long, global = true)]
    log_json: bool,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion scheduler and the heads listener
    Indexer,
    /// Serve the HTTP read API
    Api,
    /// Ensure tables, indexes and initial partitions exist
    Schema,
    /// Show version and effective configuration
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&cli.log_level, cli.log_json || cli.settings.is_production());

    match cli.command {
        Commands::Indexer => cmd_indexer::run(&cli.settings, shutdown_token()).await,
        Commands::Api => cmd_api::run(&cli.settings, shutdown_token()).await,
        Commands::Schema => cmd_schema::run(&cli.settings).await,
        Commands::Info => cmd_info(&cli.settings),
    }
}

/// Token cancelled on the first SIGINT or SIGTERM.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
            info!(signal = "SIGINT", "received signal, shutting down");
            return;
        }
    };
    let name = tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = term.recv() => "SIGTERM",
    };
    info!(signal = name, "received signal, shutting down");
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!(signal = "ctrl-c", "received signal, shutting down");
}

fn cmd_info(settings: &Settings) -> Result<()> {
    let config = settings.indexer_config();
    println!("blockindex v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("environment:        {}", settings.app_env);
    println!("api address:        {}", settings.api_socket_addr()?);
    println!("evm rpc:            {}", settings.chain_rpc_url);
    println!(
        "evm websocket:      {}",
        if settings.chain_ws_url.is_empty() { "disabled" } else { &settings.chain_ws_url }
    );
    println!("dag rpc:            {}", settings.dag_rpc_url);
    println!("poll interval:      {:?}", settings.poll_interval);
    println!("rpc timeout:        {:?}", settings.rpc_timeout);
    println!("db max connections: {}", settings.db_max_connections);
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
