//! The activity execution engine.
//!
//! Pulls one `ActivityTask` at a time, runs the registered handler under a
//! hard deadline, and durably records the attempt's outcome. On a
//! non-terminal failure the same task is re-enqueued with `attempt + 1`
//! (immediate retry, no backoff; timeout and error are retried identically).
//! On a terminal outcome the owning workflow is woken via the workflow
//! channel -- only after the outcome and its completion event are durable.

use std::time::Duration;

use chrono::Utc;

use workloom_types::error::{ActivityError, QueueError, RepositoryError};
use workloom_types::task::{ActivityOutcome, ActivityTask, OutcomeStatus};
use workloom_types::workflow::EventKind;

use crate::queue::{ACTIVITY_CHANNEL, DurableQueue, QueueMessage, WORKFLOW_CHANNEL};
use crate::registry::{ActivityRegistration, ActivityRegistry};
use crate::repository::ExecutionRepository;

// ---------------------------------------------------------------------------
// ActivityEngineError
// ---------------------------------------------------------------------------

/// Infrastructure failures while recording or routing an outcome. The worker
/// leaves the delivery unacked so the queue redelivers the attempt.
#[derive(Debug, thiserror::Error)]
pub enum ActivityEngineError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

// ---------------------------------------------------------------------------
// ActivityEngine
// ---------------------------------------------------------------------------

/// Executes activity tasks against the immutable registry.
pub struct ActivityEngine<R, Q> {
    registry: ActivityRegistry,
    repo: R,
    queue: Q,
}

impl<R: ExecutionRepository, Q: DurableQueue> ActivityEngine<R, Q> {
    pub fn new(registry: ActivityRegistry, repo: R, queue: Q) -> Self {
        Self { registry, repo, queue }
    }

    /// Run a single attempt: look up the definition, execute under its
    /// deadline, classify the result. Never touches storage or the queue.
    pub async fn execute(&self, task: &ActivityTask) -> ActivityOutcome {
        let Some(registration) = self.registry.get(&task.activity_name) else {
            let err = ActivityError::UnknownActivity(task.activity_name.clone());
            return self.outcome(task, OutcomeStatus::Failed, None, Some(err.to_string()));
        };

        self.run_attempt(task, registration).await
    }

    async fn run_attempt(
        &self,
        task: &ActivityTask,
        registration: &ActivityRegistration,
    ) -> ActivityOutcome {
        let deadline = Duration::from_secs(registration.options.timeout_secs);
        let started = std::time::Instant::now();

        let result = tokio::time::timeout(
            deadline,
            registration.handler.execute(task.args.clone()),
        )
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(value)) => {
                tracing::debug!(
                    task_id = %task.task_id,
                    activity = task.activity_name.as_str(),
                    attempt = task.attempt,
                    elapsed_ms,
                    "activity attempt succeeded"
                );
                self.outcome(task, OutcomeStatus::Success, Some(value), None)
            }
            Ok(Err(err)) => {
                tracing::warn!(
                    task_id = %task.task_id,
                    activity = task.activity_name.as_str(),
                    attempt = task.attempt,
                    error = %err,
                    "activity attempt failed"
                );
                self.outcome(task, OutcomeStatus::Failed, None, Some(err.to_string()))
            }
            Err(_elapsed) => {
                let err = ActivityError::Timeout(registration.options.timeout_secs);
                tracing::warn!(
                    task_id = %task.task_id,
                    activity = task.activity_name.as_str(),
                    attempt = task.attempt,
                    "activity attempt timed out"
                );
                self.outcome(task, OutcomeStatus::TimedOut, None, Some(err.to_string()))
            }
        }
    }

    /// Execute one attempt and apply the retry/terminal policy.
    ///
    /// Exactly one outcome is persisted per completed attempt, before any
    /// re-enqueue happens. Returns the persisted outcome.
    pub async fn process(
        &self,
        task: &ActivityTask,
    ) -> Result<ActivityOutcome, ActivityEngineError> {
        let outcome = self.execute(task).await;
        self.repo.record_outcome(&outcome).await?;

        // An unknown activity is terminal immediately: the registry never
        // changes after startup, so retrying cannot succeed.
        let tries = match self.registry.get(&task.activity_name) {
            Some(registration) => registration.options.tries.max(1),
            None => task.attempt,
        };

        if outcome.is_success() || task.attempt >= tries {
            self.finish(task, &outcome).await?;
        } else {
            let retry = task.next_attempt();
            tracing::info!(
                task_id = %task.task_id,
                activity = task.activity_name.as_str(),
                attempt = retry.attempt,
                tries,
                "re-enqueueing failed activity"
            );
            self.queue
                .enqueue(ACTIVITY_CHANNEL, &QueueMessage::Activity(retry))
                .await?;
        }

        Ok(outcome)
    }

    /// Record the terminal completion event and wake the owning workflow.
    async fn finish(
        &self,
        task: &ActivityTask,
        outcome: &ActivityOutcome,
    ) -> Result<(), ActivityEngineError> {
        let appended = self
            .repo
            .append_activity_completed(
                &task.instance_id,
                &EventKind::ActivityCompleted {
                    task_id: task.task_id,
                    status: outcome.status,
                    result: outcome.result.clone(),
                    error: outcome.error.clone(),
                    attempt: outcome.attempt,
                },
            )
            .await?;

        if !appended {
            tracing::debug!(
                task_id = %task.task_id,
                "completion already recorded, skipping duplicate event"
            );
        }

        self.queue
            .enqueue(
                WORKFLOW_CHANNEL,
                &QueueMessage::Workflow { instance_id: task.instance_id },
            )
            .await?;
        Ok(())
    }

    fn outcome(
        &self,
        task: &ActivityTask,
        status: OutcomeStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> ActivityOutcome {
        ActivityOutcome {
            task_id: task.task_id,
            instance_id: task.instance_id,
            status,
            result,
            error,
            attempt: task.attempt,
            finished_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ActivityHandler, ActivityRegistry, ActivityRegistryBuilder};
    use crate::testutil::{MemoryQueue, MemoryRepository};
    use futures_util::future::BoxFuture;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;
    use workloom_types::task::ActivityOptions;

    struct AlwaysFails {
        calls: Arc<AtomicU32>,
    }

    impl ActivityHandler for AlwaysFails {
        fn execute(&self, _args: Vec<Value>) -> BoxFuture<'static, Result<Value, ActivityError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(ActivityError::Execution("always fails".to_string())) })
        }
    }

    struct Doubles;

    impl ActivityHandler for Doubles {
        fn execute(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ActivityError>> {
            Box::pin(async move {
                let n = args
                    .first()
                    .and_then(Value::as_i64)
                    .ok_or_else(|| ActivityError::Execution("expected a number".to_string()))?;
                Ok(json!(n * 2))
            })
        }
    }

    struct Sleeps;

    impl ActivityHandler for Sleeps {
        fn execute(&self, _args: Vec<Value>) -> BoxFuture<'static, Result<Value, ActivityError>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Value::Null)
            })
        }
    }

    fn task(name: &str, args: Vec<Value>, attempt: u32) -> ActivityTask {
        ActivityTask {
            task_id: Uuid::now_v7(),
            instance_id: Uuid::now_v7(),
            activity_name: name.to_string(),
            args,
            attempt,
        }
    }

    fn engine(
        registry: ActivityRegistry,
    ) -> (
        ActivityEngine<MemoryRepository, MemoryQueue>,
        MemoryRepository,
        MemoryQueue,
    ) {
        let repo = MemoryRepository::new();
        let queue = MemoryQueue::new();
        (
            ActivityEngine::new(registry, repo.clone(), queue.clone()),
            repo,
            queue,
        )
    }

    #[tokio::test]
    async fn success_records_outcome_and_wakes_workflow() {
        let registry = ActivityRegistryBuilder::new()
            .register("double", Arc::new(Doubles), ActivityOptions::default())
            .build();
        let (engine, repo, queue) = engine(registry);

        let task = task("double", vec![json!(21)], 1);
        let outcome = engine.process(&task).await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.result, Some(json!(42)));
        assert!(repo.get_outcome(&task.task_id).await.unwrap().is_some());
        assert_eq!(queue.depth(WORKFLOW_CHANNEL), 1);
        assert_eq!(queue.depth(ACTIVITY_CHANNEL), 0);
        assert_eq!(repo.event_count(&task.instance_id), 1);
    }

    #[tokio::test]
    async fn failing_activity_is_attempted_exactly_tries_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = ActivityRegistryBuilder::new()
            .register(
                "flaky",
                Arc::new(AlwaysFails { calls: calls.clone() }),
                ActivityOptions { tries: 3, timeout_secs: 5 },
            )
            .build();
        let (engine, repo, queue) = engine(registry);

        // Drain the retry loop the way a worker would.
        let first = task("flaky", vec![], 1);
        let instance_id = first.instance_id;
        engine.process(&first).await.unwrap();

        let mut terminal = None;
        while let Some(delivery) = queue.dequeue(ACTIVITY_CHANNEL).await.unwrap() {
            let QueueMessage::Activity(next) = delivery.message else {
                panic!("unexpected message on activity channel");
            };
            terminal = Some(engine.process(&next).await.unwrap());
            queue.ack(&delivery.receipt).await.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3, "exactly `tries` attempts");
        let terminal = terminal.unwrap();
        assert_eq!(terminal.status, OutcomeStatus::Failed);
        assert_eq!(terminal.attempt, 3);
        // Exactly one completion event, after the final attempt only.
        assert_eq!(repo.event_count(&instance_id), 1);
        assert_eq!(queue.depth(WORKFLOW_CHANNEL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_yields_timed_out_and_retries() {
        let registry = ActivityRegistryBuilder::new()
            .register(
                "stuck",
                Arc::new(Sleeps),
                ActivityOptions { tries: 2, timeout_secs: 1 },
            )
            .build();
        let (engine, repo, queue) = engine(registry);

        let task = task("stuck", vec![], 1);
        let outcome = engine.process(&task).await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::TimedOut);
        assert!(outcome.error.unwrap().contains("timed out"));
        // Not terminal yet: retried on the activity channel, workflow not woken.
        assert_eq!(queue.depth(ACTIVITY_CHANNEL), 1);
        assert_eq!(queue.depth(WORKFLOW_CHANNEL), 0);
        assert_eq!(repo.event_count(&task.instance_id), 0);
    }

    #[tokio::test]
    async fn unknown_activity_is_terminal_on_first_attempt() {
        let registry = ActivityRegistryBuilder::new().build();
        let (engine, repo, queue) = engine(registry);

        let task = task("missing", vec![], 1);
        let outcome = engine.process(&task).await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.error.unwrap().contains("unknown activity"));
        assert_eq!(queue.depth(ACTIVITY_CHANNEL), 0, "no retry");
        assert_eq!(queue.depth(WORKFLOW_CHANNEL), 1, "workflow still woken");
        assert_eq!(repo.event_count(&task.instance_id), 1);
    }

    #[tokio::test]
    async fn latest_attempt_outcome_is_authoritative() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = ActivityRegistryBuilder::new()
            .register(
                "flaky",
                Arc::new(AlwaysFails { calls }),
                ActivityOptions { tries: 2, timeout_secs: 5 },
            )
            .build();
        let (engine, repo, _queue) = engine(registry);

        let first = task("flaky", vec![], 1);
        engine.process(&first).await.unwrap();
        let after_first = repo.get_outcome(&first.task_id).await.unwrap().unwrap();
        assert_eq!(after_first.attempt, 1);

        let second = first.next_attempt();
        engine.process(&second).await.unwrap();
        let after_second = repo.get_outcome(&first.task_id).await.unwrap().unwrap();
        assert_eq!(after_second.attempt, 2);
    }
}
