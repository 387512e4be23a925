//! Durable queue port and channel message types.
//!
//! The engines communicate only through this interface. Delivery is
//! at-least-once: a dequeued message is leased, not removed, and is
//! redelivered if the lease expires before `ack`. The workflow channel
//! additionally guarantees at most one in-flight delivery per instance,
//! which is what makes the single-threaded-per-instance drive loop safe.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use workloom_types::error::QueueError;
use workloom_types::task::ActivityTask;

/// Channel carrying `QueueMessage::Activity` payloads.
pub const ACTIVITY_CHANNEL: &str = "activity-tasks";

/// Channel carrying `QueueMessage::Workflow` payloads.
pub const WORKFLOW_CHANNEL: &str = "workflow-tasks";

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A message travelling on one of the two channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueMessage {
    /// Run one activity attempt.
    Activity(ActivityTask),
    /// Drive one workflow instance forward.
    Workflow { instance_id: Uuid },
}

impl QueueMessage {
    /// The workflow instance this message concerns.
    pub fn instance_id(&self) -> Uuid {
        match self {
            QueueMessage::Activity(task) => task.instance_id,
            QueueMessage::Workflow { instance_id } => *instance_id,
        }
    }
}

/// A leased delivery. `receipt` identifies the lease for `ack`.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub receipt: Uuid,
    pub message: QueueMessage,
}

// ---------------------------------------------------------------------------
// DurableQueue trait
// ---------------------------------------------------------------------------

/// At-least-once durable queue with lease-based redelivery.
pub trait DurableQueue: Send + Sync {
    /// Durably enqueue a message on a channel.
    fn enqueue(
        &self,
        channel: &str,
        message: &QueueMessage,
    ) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;

    /// Claim the oldest available message on a channel, if any.
    ///
    /// For `WORKFLOW_CHANNEL`, implementations must not hand out a message
    /// for an instance that already has an unacked delivery in flight.
    fn dequeue(
        &self,
        channel: &str,
    ) -> impl std::future::Future<Output = Result<Option<Delivery>, QueueError>> + Send;

    /// Acknowledge (and so destroy) a delivered message.
    fn ack(
        &self,
        receipt: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
