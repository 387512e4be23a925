//! Execution repository trait definition.
//!
//! Defines the storage interface for workflow instances, their append-only
//! event histories, and activity outcomes. The infrastructure layer
//! (workloom-infra) implements this trait with SQLite persistence.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use workloom_types::error::RepositoryError;
use workloom_types::task::ActivityOutcome;
use workloom_types::workflow::{EventKind, WorkflowEvent, WorkflowInstance};

/// Repository trait for durable execution state.
///
/// Covers three entity families:
/// - **Instances:** one row per workflow execution, mutated only by the
///   workflow engine.
/// - **Events:** append-only per-instance history used for replay.
/// - **Outcomes:** latest activity outcome keyed by task id.
pub trait ExecutionRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Instances
    // -----------------------------------------------------------------------

    /// Insert a freshly-started instance (status Running, empty history).
    fn create_instance(
        &self,
        instance: &WorkflowInstance,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an instance by id.
    fn get_instance(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowInstance>, RepositoryError>> + Send;

    /// Transition an instance to Completed with its final output.
    fn complete_instance(
        &self,
        id: &Uuid,
        output: &Value,
        completed_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Transition an instance to Failed with its terminal error.
    fn fail_instance(
        &self,
        id: &Uuid,
        error: &str,
        completed_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List instances, newest first.
    fn list_instances(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowInstance>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Append an event to an instance's history. Returns the assigned seq.
    fn append_event(
        &self,
        instance_id: &Uuid,
        kind: &EventKind,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Append an `ActivityCompleted` event unless one already exists for the
    /// same task id. Returns `true` if the event was appended.
    ///
    /// Redeliveries on the at-least-once queue can race a terminal outcome;
    /// this is the write-side guard that keeps the history append-only with
    /// at most one completion per task.
    fn append_activity_completed(
        &self,
        instance_id: &Uuid,
        kind: &EventKind,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Full ordered history for an instance (seq ascending).
    fn list_events(
        &self,
        instance_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowEvent>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Outcomes
    // -----------------------------------------------------------------------

    /// Record an attempt's outcome. Upserts by task id; the latest attempt
    /// is authoritative.
    fn record_outcome(
        &self,
        outcome: &ActivityOutcome,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Latest outcome for a task, if any attempt has completed.
    fn get_outcome(
        &self,
        task_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ActivityOutcome>, RepositoryError>> + Send;
}
