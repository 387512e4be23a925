//! Application state wiring the durable execution core to its SQLite
//! implementations.
//!
//! `AppState` holds the workflow client used by both CLI commands and HTTP
//! handlers, plus the database pool and loaded configuration. The client is
//! generic over repository/queue traits, but AppState pins it to the
//! concrete infra implementations.

use std::path::PathBuf;

use workloom_infra::config::{database_url, load_global_config, resolve_data_dir};
use workloom_infra::runtime::{SqliteWorkflowClient, build_client};
use workloom_infra::sqlite::pool::DatabasePool;
use workloom_types::config::GlobalConfig;

/// Shared application state for CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: SqliteWorkflowClient,
    pub db_pool: DatabasePool,
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: resolve the data directory, load
    /// config, connect to the database, wire the client.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_global_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;
        let client = build_client(&db_pool, config.worker.lease_secs);

        Ok(Self { client, db_pool, config, data_dir })
    }
}
