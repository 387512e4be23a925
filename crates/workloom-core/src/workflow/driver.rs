//! The workflow drive loop.
//!
//! Invoked once per workflow-task delivery. Each pass replays the event
//! history from seq 0, feeds completed batch results to the definition's
//! step function, and either persists a new fan-out batch (then suspends),
//! or persists the terminal transition. Suspension is simply returning
//! without re-enqueueing -- the activity engine wakes the instance when a
//! terminal outcome lands.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use workloom_types::error::{QueueError, RepositoryError, WorkflowError};
use workloom_types::task::ActivityTask;
use workloom_types::workflow::{EventKind, WorkflowInstance};

use crate::queue::{ACTIVITY_CHANNEL, DurableQueue, QueueMessage};
use crate::registry::WorkflowRegistry;
use crate::repository::ExecutionRepository;

use super::definition::{ActivityStub, NextAction};
use super::replay::{ReplayState, ScheduledBatch};

/// Guard against a definition that fans out empty batches forever.
const MAX_EMPTY_FANOUTS: usize = 64;

// ---------------------------------------------------------------------------
// DriveOutcome
// ---------------------------------------------------------------------------

/// What a single drive pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveOutcome {
    /// New activities were dispatched (or pending ones are still running);
    /// the instance is suspended awaiting outcomes.
    Suspended { scheduled: usize },
    /// The instance reached Completed.
    Completed,
    /// The instance reached Failed.
    Failed { error: String },
    /// The instance was already terminal; the delivery was redundant.
    AlreadyTerminal,
}

// ---------------------------------------------------------------------------
// DriverError
// ---------------------------------------------------------------------------

/// Errors that abort a drive pass without deciding the instance's fate.
///
/// These are infrastructure failures: the worker leaves the delivery
/// unacked so the queue redelivers it. Workflow-level failures never
/// surface here -- they terminate the instance instead.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

// ---------------------------------------------------------------------------
// WorkflowDriver
// ---------------------------------------------------------------------------

/// Drives workflow instances forward from their durable histories.
pub struct WorkflowDriver<R, Q> {
    repo: R,
    queue: Q,
    workflows: WorkflowRegistry,
}

impl<R: ExecutionRepository, Q: DurableQueue> WorkflowDriver<R, Q> {
    pub fn new(repo: R, queue: Q, workflows: WorkflowRegistry) -> Self {
        Self { repo, queue, workflows }
    }

    /// Run one drive pass for an instance.
    pub async fn drive(&self, instance_id: Uuid) -> Result<DriveOutcome, DriverError> {
        let instance = self
            .repo
            .get_instance(&instance_id)
            .await?
            .ok_or(WorkflowError::InstanceNotFound(instance_id))?;

        if instance.status.is_terminal() {
            tracing::debug!(instance_id = %instance_id, "redundant delivery for terminal instance");
            return Ok(DriveOutcome::AlreadyTerminal);
        }

        let definition = self
            .workflows
            .get(&instance.workflow_name)
            .ok_or_else(|| WorkflowError::UnknownWorkflow(instance.workflow_name.clone()))?;

        let events = self.repo.list_events(&instance_id).await?;
        let state = match ReplayState::from_events(&events) {
            Ok(state) => state,
            Err(err @ WorkflowError::ReplayMismatch { .. }) => {
                return self.fail(&instance, err.to_string()).await;
            }
            Err(err) => return Err(err.into()),
        };

        // Crash between terminal event append and the instance-row update:
        // finish the row and stop.
        if let Some(terminal) = &state.terminal {
            return self.sync_terminal(&instance, terminal).await;
        }

        // Replay: drive the step function from scratch, consuming recorded
        // batches in schedule order. Empty fan-outs resolve inline and are
        // never persisted -- the pure step function reproduces them -- so
        // recorded batch numbering is dense over non-empty fan-outs only.
        let mut completed: Vec<Vec<Value>> = Vec::new();
        let mut recorded_consumed = 0usize;
        let mut empty_fanouts = 0usize;
        loop {
            let action = match definition.step(&instance.input, &completed) {
                Ok(action) => action,
                Err(err) => return self.fail(&instance, err.to_string()).await,
            };

            match action {
                NextAction::ScheduleActivities(stubs) if stubs.is_empty() => {
                    // An empty fan-out resolves immediately with an empty
                    // result batch.
                    empty_fanouts += 1;
                    if empty_fanouts > MAX_EMPTY_FANOUTS {
                        let err = WorkflowError::Definition(
                            "definition produced an unbounded run of empty fan-outs".to_string(),
                        );
                        return self.fail(&instance, err.to_string()).await;
                    }
                    completed.push(Vec::new());
                }
                NextAction::ScheduleActivities(stubs) => {
                    if recorded_consumed < state.batches.len() {
                        // Batch already recorded: check the definition still
                        // agrees with history before trusting its results.
                        let recorded = &state.batches[recorded_consumed];
                        if let Err(err) =
                            verify_recorded_batch(recorded_consumed, recorded, &stubs)
                        {
                            return self.fail(&instance, err.to_string()).await;
                        }
                        if let Some((activity, error)) = recorded.first_failure() {
                            let err = WorkflowError::ActivityFailed {
                                activity: activity.to_string(),
                                error: error.to_string(),
                            };
                            return self.fail(&instance, err.to_string()).await;
                        }
                        if !recorded.is_complete() {
                            return Ok(DriveOutcome::Suspended { scheduled: 0 });
                        }
                        completed.push(recorded.ordered_results());
                        recorded_consumed += 1;
                        continue;
                    }
                    return self
                        .schedule_batch(&instance, recorded_consumed as u32, stubs)
                        .await;
                }
                NextAction::Complete(output) => {
                    self.repo
                        .append_event(
                            &instance.id,
                            &EventKind::WorkflowCompleted { output: output.clone() },
                        )
                        .await?;
                    self.repo
                        .complete_instance(&instance.id, &output, Utc::now())
                        .await?;
                    tracing::info!(instance_id = %instance.id, workflow = instance.workflow_name.as_str(), "workflow completed");
                    return Ok(DriveOutcome::Completed);
                }
                NextAction::Fail(error) => {
                    return self.fail(&instance, error).await;
                }
            }
        }
    }

    /// Persist one fan-out batch and dispatch its tasks.
    async fn schedule_batch(
        &self,
        instance: &WorkflowInstance,
        batch: u32,
        stubs: Vec<ActivityStub>,
    ) -> Result<DriveOutcome, DriverError> {
        let scheduled = stubs.len();
        for (index, stub) in stubs.into_iter().enumerate() {
            let task_id = Uuid::now_v7();
            self.repo
                .append_event(
                    &instance.id,
                    &EventKind::ActivityScheduled {
                        batch,
                        index: index as u32,
                        task_id,
                        activity_name: stub.activity_name.clone(),
                        args: stub.args.clone(),
                    },
                )
                .await?;
            self.queue
                .enqueue(
                    ACTIVITY_CHANNEL,
                    &QueueMessage::Activity(ActivityTask {
                        task_id,
                        instance_id: instance.id,
                        activity_name: stub.activity_name,
                        args: stub.args,
                        attempt: 1,
                    }),
                )
                .await?;
        }
        tracing::info!(
            instance_id = %instance.id,
            workflow = instance.workflow_name.as_str(),
            batch,
            scheduled,
            "fan-out dispatched, suspending"
        );
        Ok(DriveOutcome::Suspended { scheduled })
    }

    /// Terminate the instance as Failed, recording the error in history.
    async fn fail(
        &self,
        instance: &WorkflowInstance,
        error: String,
    ) -> Result<DriveOutcome, DriverError> {
        self.repo
            .append_event(&instance.id, &EventKind::WorkflowFailed { error: error.clone() })
            .await?;
        self.repo
            .fail_instance(&instance.id, &error, Utc::now())
            .await?;
        tracing::warn!(
            instance_id = %instance.id,
            workflow = instance.workflow_name.as_str(),
            error = error.as_str(),
            "workflow failed"
        );
        Ok(DriveOutcome::Failed { error })
    }

    /// Bring the instance row in line with an already-recorded terminal event.
    async fn sync_terminal(
        &self,
        instance: &WorkflowInstance,
        terminal: &EventKind,
    ) -> Result<DriveOutcome, DriverError> {
        match terminal {
            EventKind::WorkflowCompleted { output } => {
                self.repo
                    .complete_instance(&instance.id, output, Utc::now())
                    .await?;
                tracing::info!(instance_id = %instance.id, "synced completed status from history");
                Ok(DriveOutcome::Completed)
            }
            EventKind::WorkflowFailed { error } => {
                self.repo
                    .fail_instance(&instance.id, error, Utc::now())
                    .await?;
                tracing::warn!(instance_id = %instance.id, "synced failed status from history");
                Ok(DriveOutcome::Failed { error: error.clone() })
            }
            _ => unreachable!("sync_terminal called with non-terminal event"),
        }
    }
}

/// Check that a re-derived batch agrees with what history recorded.
fn verify_recorded_batch(
    batch_index: usize,
    recorded: &ScheduledBatch,
    stubs: &[ActivityStub],
) -> Result<(), WorkflowError> {
    if recorded.activities.len() != stubs.len() {
        return Err(WorkflowError::ReplayMismatch {
            batch: batch_index as u32,
            detail: format!(
                "definition wants {} stubs, history recorded {}",
                stubs.len(),
                recorded.activities.len()
            ),
        });
    }
    for (slot, stub) in recorded.activities.iter().zip(stubs) {
        if slot.activity_name != stub.activity_name || slot.args != stub.args {
            return Err(WorkflowError::ReplayMismatch {
                batch: batch_index as u32,
                detail: format!(
                    "definition wants '{}', history recorded '{}'",
                    stub.activity_name, slot.activity_name
                ),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
