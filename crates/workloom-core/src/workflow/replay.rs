//! Replay-state reconstruction from an event history.
//!
//! The drive loop never trusts in-memory state across deliveries; it
//! rebuilds its position from the ordered event history every time. This
//! module turns the flat event list back into scheduled batches with their
//! correlated outcomes. Correlation is by task id, and result order within a
//! batch is the `(batch, index)` recorded at schedule time -- arrival order
//! plays no part.

use serde_json::Value;
use uuid::Uuid;

use workloom_types::error::WorkflowError;
use workloom_types::task::OutcomeStatus;
use workloom_types::workflow::{EventKind, WorkflowEvent};

// ---------------------------------------------------------------------------
// Reconstructed state
// ---------------------------------------------------------------------------

/// The recorded terminal outcome of one scheduled activity.
#[derive(Debug, Clone)]
pub struct CompletedActivity {
    pub status: OutcomeStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// One activity slot within a fan-out batch.
#[derive(Debug, Clone)]
pub struct ScheduledActivity {
    pub task_id: Uuid,
    pub activity_name: String,
    pub args: Vec<Value>,
    pub outcome: Option<CompletedActivity>,
}

/// One fan-out batch, in stub order.
#[derive(Debug, Clone, Default)]
pub struct ScheduledBatch {
    pub activities: Vec<ScheduledActivity>,
}

impl ScheduledBatch {
    /// Every slot has a terminal outcome.
    pub fn is_complete(&self) -> bool {
        self.activities.iter().all(|a| a.outcome.is_some())
    }

    /// First recorded non-success outcome, if any: `(activity_name, error)`.
    pub fn first_failure(&self) -> Option<(&str, &str)> {
        self.activities.iter().find_map(|a| match &a.outcome {
            Some(outcome) if outcome.status != OutcomeStatus::Success => Some((
                a.activity_name.as_str(),
                outcome.error.as_deref().unwrap_or("activity failed"),
            )),
            _ => None,
        })
    }

    /// Results in stub order. Only meaningful once the batch is complete and
    /// failure-free; missing or failed slots yield `Value::Null`.
    pub fn ordered_results(&self) -> Vec<Value> {
        self.activities
            .iter()
            .map(|a| {
                a.outcome
                    .as_ref()
                    .and_then(|o| o.result.clone())
                    .unwrap_or(Value::Null)
            })
            .collect()
    }
}

/// Everything the drive loop needs to know about where an instance stands.
#[derive(Debug, Clone, Default)]
pub struct ReplayState {
    /// Fan-out batches in the order they were scheduled.
    pub batches: Vec<ScheduledBatch>,
    /// Terminal event, if the history already ended.
    pub terminal: Option<EventKind>,
}

impl ReplayState {
    /// Rebuild state from an ordered (seq ascending) event history.
    ///
    /// A history that contradicts itself -- a completion for a task that was
    /// never scheduled, or batch/index numbering that does not line up with
    /// append order -- is reported as `ReplayMismatch` and is fatal for the
    /// instance.
    pub fn from_events(events: &[WorkflowEvent]) -> Result<Self, WorkflowError> {
        let mut state = ReplayState::default();

        for event in events {
            match &event.kind {
                EventKind::ActivityScheduled {
                    batch,
                    index,
                    task_id,
                    activity_name,
                    args,
                } => {
                    let batch_idx = *batch as usize;
                    if batch_idx == state.batches.len() {
                        state.batches.push(ScheduledBatch::default());
                    }
                    let Some(current) = state.batches.get_mut(batch_idx) else {
                        return Err(WorkflowError::ReplayMismatch {
                            batch: *batch,
                            detail: format!(
                                "scheduled event for batch {batch} arrived out of order"
                            ),
                        });
                    };
                    if *index as usize != current.activities.len() {
                        return Err(WorkflowError::ReplayMismatch {
                            batch: *batch,
                            detail: format!(
                                "scheduled index {index} does not match slot {}",
                                current.activities.len()
                            ),
                        });
                    }
                    current.activities.push(ScheduledActivity {
                        task_id: *task_id,
                        activity_name: activity_name.clone(),
                        args: args.clone(),
                        outcome: None,
                    });
                }
                EventKind::ActivityCompleted {
                    task_id,
                    status,
                    result,
                    error,
                    ..
                } => {
                    let slot = state
                        .batches
                        .iter_mut()
                        .flat_map(|b| b.activities.iter_mut())
                        .find(|a| a.task_id == *task_id);
                    match slot {
                        Some(slot) => {
                            // Outcomes are immutable; a redelivered duplicate
                            // completion is ignored.
                            if slot.outcome.is_none() {
                                slot.outcome = Some(CompletedActivity {
                                    status: *status,
                                    result: result.clone(),
                                    error: error.clone(),
                                });
                            }
                        }
                        None => {
                            return Err(WorkflowError::ReplayMismatch {
                                batch: state.batches.len().saturating_sub(1) as u32,
                                detail: format!(
                                    "completion for unscheduled task {task_id}"
                                ),
                            });
                        }
                    }
                }
                terminal @ (EventKind::WorkflowCompleted { .. }
                | EventKind::WorkflowFailed { .. }) => {
                    if state.terminal.is_none() {
                        state.terminal = Some(terminal.clone());
                    }
                }
            }
        }

        Ok(state)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
