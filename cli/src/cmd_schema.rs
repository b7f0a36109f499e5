//! `blockindex schema`: bootstrap the database and report declared windows.

use anyhow::{Context, Result};
use blockindex_core::{BlockStore, Source};
use blockindex_storage::PostgresStorage;

use crate::config::Settings;

pub async fn run(settings: &Settings) -> Result<()> {
    let storage = PostgresStorage::connect(&settings.postgres_url, settings.postgres_options())
        .await
        .context("connect to postgres")?;
    storage.ensure_schema().await.context("ensure schema")?;

    let plan = storage.plan();
    println!("schema ready (partition width {})", plan.width);
    for source in Source::ALL {
        let windows = storage.declared_windows(source).await?;
        let latest = storage.latest_number(source).await?;
        println!(
            "  {:<11} {} windows, covers [0, {}), latest {}",
            source.table(),
            windows,
            plan.range(windows.saturating_sub(1)).end,
            latest.map_or_else(|| "none".to_owned(), |n| n.to_string()),
        );
    }
    Ok(())
}
