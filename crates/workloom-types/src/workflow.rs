//! Workflow instance and event-history types.
//!
//! A `WorkflowInstance` is one execution of a registered workflow definition.
//! Its `WorkflowEvent` history is an append-only log; replaying the ordered
//! events through the definition deterministically reconstructs the exact
//! point of suspension, which is what makes crash recovery correct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::task::OutcomeStatus;

// ---------------------------------------------------------------------------
// WorkflowInstance
// ---------------------------------------------------------------------------

/// Overall status of a workflow instance.
///
/// `Completed` and `Failed` are terminal; no instance ever transitions out
/// of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Completed,
    Failed,
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceStatus::Completed | InstanceStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Running => "running",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(InstanceStatus::Running),
            "completed" => Ok(InstanceStatus::Completed),
            "failed" => Ok(InstanceStatus::Failed),
            other => Err(format!("invalid instance status: '{other}'")),
        }
    }
}

/// One execution of a workflow definition.
///
/// Owned exclusively by the workflow execution engine; mutated only by that
/// engine, never by client code or activities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// UUIDv7 allocated at start.
    pub id: Uuid,
    /// Name of the registered workflow definition.
    pub workflow_name: String,
    /// Opaque input value passed at start.
    pub input: Value,
    /// Current status.
    pub status: InstanceStatus,
    /// Final output (present once `Completed`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Terminal error message (present once `Failed`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the instance was started.
    pub created_at: DateTime<Utc>,
    /// When the instance reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// WorkflowEvent
// ---------------------------------------------------------------------------

/// The kind and payload of one history event.
///
/// Internally tagged so the serialized form carries its own `kind`
/// discriminator, matching the persisted JSON layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// An activity was dispatched as part of a fan-out batch.
    ///
    /// `batch` is the 0-based index of the `ScheduleActivities` pass that
    /// produced it; `index` is the stub's position within that pass. Results
    /// are correlated by `(batch, index)`, never by arrival time.
    ActivityScheduled {
        batch: u32,
        index: u32,
        task_id: Uuid,
        activity_name: String,
        args: Vec<Value>,
    },
    /// The terminal outcome of a scheduled activity arrived.
    ActivityCompleted {
        task_id: Uuid,
        status: OutcomeStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        attempt: u32,
    },
    /// The definition returned its final value.
    WorkflowCompleted { output: Value },
    /// The definition raised a terminal error (or an awaited activity
    /// failed terminally).
    WorkflowFailed { error: String },
}

impl EventKind {
    /// Stable name used for the persisted `kind` column.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ActivityScheduled { .. } => "activity_scheduled",
            EventKind::ActivityCompleted { .. } => "activity_completed",
            EventKind::WorkflowCompleted { .. } => "workflow_completed",
            EventKind::WorkflowFailed { .. } => "workflow_failed",
        }
    }

    /// The task this event refers to, if any.
    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            EventKind::ActivityScheduled { task_id, .. }
            | EventKind::ActivityCompleted { task_id, .. } => Some(*task_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::WorkflowCompleted { .. } | EventKind::WorkflowFailed { .. }
        )
    }
}

/// Append-only entry in a per-instance history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub instance_id: Uuid,
    /// Strictly increasing per instance, starting at 0.
    pub seq: u64,
    pub kind: EventKind,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
