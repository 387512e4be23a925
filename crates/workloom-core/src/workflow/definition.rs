//! The workflow definition contract.
//!
//! A workflow is a pure step function over its input and the ordered results
//! of every previously completed fan-out batch. The engine drives the
//! function repeatedly, persisting each transition; no language-level
//! suspension primitive is involved, so the same history always reconstructs
//! the same position.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use workloom_types::error::WorkflowError;

// ---------------------------------------------------------------------------
// ActivityStub
// ---------------------------------------------------------------------------

/// An unresolved reference to one activity invocation: "run this activity
/// with these args". Carries no result until the engine resolves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityStub {
    pub activity_name: String,
    pub args: Vec<Value>,
}

impl ActivityStub {
    pub fn new(activity_name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            activity_name: activity_name.into(),
            args,
        }
    }
}

// ---------------------------------------------------------------------------
// NextAction
// ---------------------------------------------------------------------------

/// What the definition wants to happen next.
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    /// Fan out: dispatch every stub concurrently and suspend until all of
    /// them have terminal outcomes. Results are delivered back in stub
    /// order, regardless of completion order.
    ScheduleActivities(Vec<ActivityStub>),
    /// The workflow is done; this is its output.
    Complete(Value),
    /// The workflow failed terminally.
    Fail(String),
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// A deterministic, resumable, multi-step computation.
///
/// `step` must be a pure function of `(input, completed)`: no wall-clock
/// reads, no randomness, no IO. `completed[i]` holds the ordered results of
/// the i-th `ScheduleActivities` batch. Given the same arguments the
/// function must always return the same action -- that is what makes
/// replay-based recovery after a crash correct.
pub trait WorkflowDefinition: Send + Sync {
    /// Registered name of this workflow.
    fn name(&self) -> &str;

    /// Decide the next transition from the results accumulated so far.
    fn step(&self, input: &Value, completed: &[Vec<Value>]) -> Result<NextAction, WorkflowError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
