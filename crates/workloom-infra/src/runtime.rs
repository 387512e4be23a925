//! Worker runtime assembly.
//!
//! Wires the SQLite-backed repository and queue to the core engines, builds
//! the immutable registries, and spawns the two worker pools. This is the
//! composition root the `wloom work` command (and the embedded-worker mode
//! of `wloom serve`) runs.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use workloom_core::activity::engine::ActivityEngine;
use workloom_core::registry::{
    ActivityRegistry, ActivityRegistryBuilder, WorkflowRegistry, WorkflowRegistryBuilder,
};
use workloom_core::worker::spawn_workers;
use workloom_core::workflow::driver::WorkflowDriver;
use workloom_core::workflow::handle::WorkflowClient;
use workloom_types::config::WorkerConfig;

use crate::activity::hash::{COMPUTE_HASH_ACTIVITY, ComputeHashActivity, compute_hash_options};
use crate::sqlite::execution::SqliteExecutionRepository;
use crate::sqlite::pool::DatabasePool;
use crate::sqlite::queue::SqliteQueue;
use crate::workflow::image_hash::ImageHashWorkflow;

/// The client type pinned to the SQLite implementations.
pub type SqliteWorkflowClient = WorkflowClient<SqliteExecutionRepository, SqliteQueue>;

/// All activities this deployment knows about.
pub fn build_activity_registry() -> ActivityRegistry {
    ActivityRegistryBuilder::new()
        .register(
            COMPUTE_HASH_ACTIVITY,
            Arc::new(ComputeHashActivity),
            compute_hash_options(),
        )
        .build()
}

/// All workflows this deployment knows about.
pub fn build_workflow_registry() -> WorkflowRegistry {
    WorkflowRegistryBuilder::new()
        .register(Arc::new(ImageHashWorkflow))
        .build()
}

/// Build a client sharing the pool's repository and queue.
pub fn build_client(pool: &DatabasePool, lease_secs: u64) -> SqliteWorkflowClient {
    WorkflowClient::new(
        SqliteExecutionRepository::new(pool.clone()),
        SqliteQueue::with_lease_secs(pool.clone(), lease_secs),
        build_workflow_registry(),
    )
}

/// Spawn the activity and workflow worker pools against the given pool.
pub fn spawn_runtime(
    pool: &DatabasePool,
    worker: WorkerConfig,
    shutdown: CancellationToken,
) -> JoinSet<()> {
    let repo = SqliteExecutionRepository::new(pool.clone());
    let queue = SqliteQueue::with_lease_secs(pool.clone(), worker.lease_secs);

    let engine = Arc::new(ActivityEngine::new(
        build_activity_registry(),
        repo.clone(),
        queue.clone(),
    ));
    let driver = Arc::new(WorkflowDriver::new(
        repo,
        queue.clone(),
        build_workflow_registry(),
    ));

    tracing::info!(
        activity_workers = worker.activity_workers,
        workflow_workers = worker.workflow_workers,
        "starting worker pools"
    );

    spawn_workers(engine, driver, queue, worker, shutdown)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
