//! Activity task and outcome types.
//!
//! An `ActivityTask` is one unit of work dispatched to the activity queue by
//! the workflow engine. An `ActivityOutcome` is the durable record of one
//! completed attempt; the store keeps the latest attempt per task, which is
//! authoritative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ActivityTask
// ---------------------------------------------------------------------------

/// A single activity invocation travelling on the `activity-tasks` channel.
///
/// Created by the workflow engine when a stub is dispatched; acked once its
/// outcome is durably recorded. `attempt` is 1-based and increments on each
/// retry re-enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityTask {
    /// Stable identity of this invocation (shared across retry attempts).
    pub task_id: Uuid,
    /// The workflow instance that scheduled this task.
    pub instance_id: Uuid,
    /// Registered activity name.
    pub activity_name: String,
    /// Opaque serialized arguments, in positional order.
    pub args: Vec<Value>,
    /// Attempt number, starting at 1.
    pub attempt: u32,
}

impl ActivityTask {
    /// Build the task for the next retry attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            task_id: self.task_id,
            instance_id: self.instance_id,
            activity_name: self.activity_name.clone(),
            args: self.args.clone(),
            attempt: self.attempt + 1,
        }
    }
}

// ---------------------------------------------------------------------------
// ActivityOutcome
// ---------------------------------------------------------------------------

/// Status of one completed activity attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    TimedOut,
}

/// Durable record of one completed activity attempt.
///
/// Immutable once written. The outcome store is keyed by `task_id`; the
/// latest attempt wins on write, so queries always observe the authoritative
/// result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityOutcome {
    pub task_id: Uuid,
    pub instance_id: Uuid,
    pub status: OutcomeStatus,
    /// Result value on success, `None` otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message on failure or timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The attempt this outcome belongs to (1-based).
    pub attempt: u32,
    /// When the attempt finished.
    pub finished_at: DateTime<Utc>,
}

impl ActivityOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

// ---------------------------------------------------------------------------
// ActivityOptions
// ---------------------------------------------------------------------------

/// Static per-activity execution policy, declared once at registration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActivityOptions {
    /// Maximum number of attempts (>= 1).
    #[serde(default = "default_tries")]
    pub tries: u32,
    /// Hard deadline for a single attempt, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            tries: default_tries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn activity_task_json_roundtrip() {
        let task = ActivityTask {
            task_id: Uuid::now_v7(),
            instance_id: Uuid::now_v7(),
            activity_name: "compute-hash".to_string(),
            args: vec![json!({"repr": "ints", "data": [1, 2, 3]}), json!("sha256")],
            attempt: 1,
        };
        let s = serde_json::to_string(&task).unwrap();
        let parsed: ActivityTask = serde_json::from_str(&s).unwrap();
        assert_eq!(parsed.task_id, task.task_id);
        assert_eq!(parsed.activity_name, "compute-hash");
        assert_eq!(parsed.args.len(), 2);
        assert_eq!(parsed.attempt, 1);
    }

    #[test]
    fn next_attempt_increments_and_keeps_identity() {
        let task = ActivityTask {
            task_id: Uuid::now_v7(),
            instance_id: Uuid::now_v7(),
            activity_name: "compute-hash".to_string(),
            args: vec![json!(1)],
            attempt: 1,
        };
        let retry = task.next_attempt();
        assert_eq!(retry.task_id, task.task_id);
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.args, task.args);
    }

    #[test]
    fn outcome_status_serde_tags() {
        assert_eq!(
            serde_json::to_string(&OutcomeStatus::TimedOut).unwrap(),
            "\"timed_out\""
        );
        let parsed: OutcomeStatus = serde_json::from_str("\"success\"").unwrap();
        assert_eq!(parsed, OutcomeStatus::Success);
    }

    #[test]
    fn outcome_success_helper() {
        let outcome = ActivityOutcome {
            task_id: Uuid::now_v7(),
            instance_id: Uuid::now_v7(),
            status: OutcomeStatus::Success,
            result: Some(json!({"digest": "abc"})),
            error: None,
            attempt: 2,
            finished_at: Utc::now(),
        };
        assert!(outcome.is_success());
    }

    #[test]
    fn activity_options_defaults() {
        let opts: ActivityOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.tries, 3);
        assert_eq!(opts.timeout_secs, 300);
    }
}
