use thiserror::Error;
use uuid::Uuid;

/// Errors raised while executing a single activity attempt.
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("unknown activity '{0}'")]
    UnknownActivity(String),

    #[error("activity timed out after {0}s")]
    Timeout(u64),

    #[error("activity execution error: {0}")]
    Execution(String),
}

/// Errors raised by the workflow execution engine and client handle.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("unknown workflow '{0}'")]
    UnknownWorkflow(String),

    #[error("workflow instance not found: {0}")]
    InstanceNotFound(Uuid),

    #[error("workflow {0} is not completed")]
    NotCompleted(Uuid),

    #[error("instance {id} belongs to workflow '{actual}', not '{requested}'")]
    NameMismatch {
        id: Uuid,
        actual: String,
        requested: String,
    },

    #[error("replay mismatch at batch {batch}: {detail}")]
    ReplayMismatch { batch: u32, detail: String },

    #[error("activity '{activity}' failed terminally: {error}")]
    ActivityFailed { activity: String, error: String },

    #[error("workflow definition error: {0}")]
    Definition(String),
}

/// Errors from repository operations (used by trait definitions in
/// workloom-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the durable queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),

    #[error("malformed queue payload: {0}")]
    Payload(String),
}
