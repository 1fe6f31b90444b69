//! HTTP server for the event store

use anyhow::Context;
use clap::Parser;
use databalancer::config::{BalancerConfig, Overrides};
use databalancer::db::SqliteConnection;
use databalancer::ingest::{EventStore, IngestService};
use databalancer::logging::init_tracing;
use databalancer::server;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let overrides = Overrides::parse();
    let config = BalancerConfig::from_env()?.with_overrides(&overrides);
    init_tracing(&config.log_level)?;

    info!(
        database = %config.database_path.display(),
        mode = %config.storage_mode,
        cache_tables = config.cache_tables,
        "starting databalancer"
    );

    let conn = SqliteConnection::open(&config.database_path)
        .with_context(|| format!("failed to open database {}", config.database_path.display()))?;
    let store: Arc<dyn EventStore> = Arc::new(IngestService::from_connection(
        Arc::new(conn),
        config.storage_mode,
        config.cache_tables,
    ));

    server::serve(&config.server_address, store, config.max_body_bytes).await?;
    Ok(())
}
