//! The two worker pools.
//!
//! Activity workers and workflow workers are independent sets of tokio
//! tasks sharing one durable queue. Each worker is a poll loop: claim a
//! delivery, process it, ack. A delivery is only acked after its effects
//! are durable, so a crash mid-processing redelivers the message once the
//! lease expires.
//!
//! The workflow pool additionally keeps an in-process in-flight map so two
//! local workers can never drive the same instance concurrently, even if a
//! queue implementation were to mis-handle the per-instance exclusion.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use workloom_types::config::WorkerConfig;

use crate::activity::engine::ActivityEngine;
use crate::queue::{ACTIVITY_CHANNEL, Delivery, DurableQueue, QueueMessage, WORKFLOW_CHANNEL};
use crate::repository::ExecutionRepository;
use crate::workflow::driver::WorkflowDriver;

/// Spawn both pools onto a `JoinSet`, running until `shutdown` is cancelled.
pub fn spawn_workers<R, Q>(
    engine: Arc<ActivityEngine<R, Q>>,
    driver: Arc<WorkflowDriver<R, Q>>,
    queue: Q,
    config: WorkerConfig,
    shutdown: CancellationToken,
) -> JoinSet<()>
where
    R: ExecutionRepository + 'static,
    Q: DurableQueue + Clone + 'static,
{
    let mut workers = JoinSet::new();
    let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));

    for worker_idx in 0..config.activity_workers.max(1) {
        let engine = Arc::clone(&engine);
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        workers.spawn(async move {
            tracing::debug!(worker_idx, "activity worker started");
            activity_worker_loop(engine, queue, poll_interval, shutdown).await;
            tracing::debug!(worker_idx, "activity worker stopped");
        });
    }

    let in_flight: Arc<DashMap<Uuid, ()>> = Arc::new(DashMap::new());
    for worker_idx in 0..config.workflow_workers.max(1) {
        let driver = Arc::clone(&driver);
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        let in_flight = Arc::clone(&in_flight);
        workers.spawn(async move {
            tracing::debug!(worker_idx, "workflow worker started");
            workflow_worker_loop(driver, queue, in_flight, poll_interval, shutdown).await;
            tracing::debug!(worker_idx, "workflow worker stopped");
        });
    }

    workers
}

// ---------------------------------------------------------------------------
// Activity workers
// ---------------------------------------------------------------------------

async fn activity_worker_loop<R, Q>(
    engine: Arc<ActivityEngine<R, Q>>,
    queue: Q,
    poll_interval: Duration,
    shutdown: CancellationToken,
) where
    R: ExecutionRepository,
    Q: DurableQueue,
{
    loop {
        let delivery = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = queue.dequeue(ACTIVITY_CHANNEL) => result,
        };

        match delivery {
            Ok(Some(Delivery { receipt, message: QueueMessage::Activity(task) })) => {
                match engine.process(&task).await {
                    Ok(_) => {
                        if let Err(err) = queue.ack(&receipt).await {
                            tracing::error!(error = %err, "failed to ack activity delivery");
                        }
                    }
                    Err(err) => {
                        // Leave unacked; the lease expiry redelivers the attempt.
                        tracing::error!(
                            task_id = %task.task_id,
                            error = %err,
                            "activity processing failed, leaving for redelivery"
                        );
                    }
                }
            }
            Ok(Some(Delivery { receipt, message })) => {
                tracing::warn!(?message, "non-activity message on activity channel, dropping");
                let _ = queue.ack(&receipt).await;
            }
            Ok(None) => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "activity dequeue failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow workers
// ---------------------------------------------------------------------------

async fn workflow_worker_loop<R, Q>(
    driver: Arc<WorkflowDriver<R, Q>>,
    queue: Q,
    in_flight: Arc<DashMap<Uuid, ()>>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) where
    R: ExecutionRepository,
    Q: DurableQueue,
{
    loop {
        let delivery = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = queue.dequeue(WORKFLOW_CHANNEL) => result,
        };

        match delivery {
            Ok(Some(Delivery { receipt, message: QueueMessage::Workflow { instance_id } })) => {
                // Second line of defence behind the queue's per-instance
                // exclusion. The entry guard is dropped before any await.
                let claimed = match in_flight.entry(instance_id) {
                    dashmap::mapref::entry::Entry::Occupied(_) => false,
                    dashmap::mapref::entry::Entry::Vacant(vacant) => {
                        vacant.insert(());
                        true
                    }
                };
                if !claimed {
                    tracing::debug!(
                        instance_id = %instance_id,
                        "instance already in flight locally, leaving for redelivery"
                    );
                    continue;
                }

                let result = driver.drive(instance_id).await;
                in_flight.remove(&instance_id);

                match result {
                    Ok(_) => {
                        if let Err(err) = queue.ack(&receipt).await {
                            tracing::error!(error = %err, "failed to ack workflow delivery");
                        }
                    }
                    Err(err) => {
                        tracing::error!(
                            instance_id = %instance_id,
                            error = %err,
                            "drive pass failed, leaving for redelivery"
                        );
                    }
                }
            }
            Ok(Some(Delivery { receipt, message })) => {
                tracing::warn!(?message, "non-workflow message on workflow channel, dropping");
                let _ = queue.ack(&receipt).await;
            }
            Ok(None) => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "workflow dequeue failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        ActivityHandler, ActivityRegistryBuilder, WorkflowRegistryBuilder,
    };
    use crate::testutil::{MemoryQueue, MemoryRepository};
    use crate::workflow::definition::{ActivityStub, NextAction, WorkflowDefinition};
    use crate::workflow::handle::WorkflowClient;
    use futures_util::future::BoxFuture;
    use serde_json::{Value, json};
    use workloom_types::error::{ActivityError, WorkflowError};
    use workloom_types::task::ActivityOptions;
    use workloom_types::workflow::InstanceStatus;

    struct Upper;

    impl ActivityHandler for Upper {
        fn execute(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ActivityError>> {
            Box::pin(async move {
                let s = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| ActivityError::Execution("expected a string".to_string()))?
                    .to_uppercase();
                Ok(json!(s))
            })
        }
    }

    struct UpperAll;

    impl WorkflowDefinition for UpperAll {
        fn name(&self) -> &str {
            "upper-all"
        }

        fn step(
            &self,
            input: &Value,
            completed: &[Vec<Value>],
        ) -> Result<NextAction, WorkflowError> {
            match completed {
                [] => {
                    let items = input.as_array().cloned().unwrap_or_default();
                    Ok(NextAction::ScheduleActivities(
                        items
                            .into_iter()
                            .map(|item| ActivityStub::new("upper", vec![item]))
                            .collect(),
                    ))
                }
                [results] => Ok(NextAction::Complete(json!(results))),
                _ => Err(WorkflowError::Definition("unexpected batch".into())),
            }
        }
    }

    /// End-to-end through the pools: start, let the workers run the fan-out,
    /// observe completion via the handle.
    #[tokio::test]
    async fn pools_run_a_workflow_to_completion() {
        let repo = MemoryRepository::new();
        let queue = MemoryQueue::new();

        let activities = ActivityRegistryBuilder::new()
            .register(
                "upper",
                Arc::new(Upper),
                ActivityOptions { tries: 2, timeout_secs: 5 },
            )
            .build();
        let workflows = WorkflowRegistryBuilder::new()
            .register(Arc::new(UpperAll))
            .build();

        let engine = Arc::new(ActivityEngine::new(
            activities,
            repo.clone(),
            queue.clone(),
        ));
        let driver = Arc::new(WorkflowDriver::new(
            repo.clone(),
            queue.clone(),
            workflows.clone(),
        ));
        let client = WorkflowClient::new(repo.clone(), queue.clone(), workflows);

        let shutdown = CancellationToken::new();
        let config = WorkerConfig {
            activity_workers: 2,
            workflow_workers: 2,
            poll_interval_ms: 5,
            lease_secs: 60,
        };
        let mut workers = spawn_workers(engine, driver, queue.clone(), config, shutdown.clone());

        let handle = client
            .make("upper-all")
            .unwrap()
            .start(json!(["ab", "cd", "ef"]))
            .await
            .unwrap();

        // Poll the handle until the workers finish the instance.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if handle.status().await.unwrap().is_terminal() {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "workflow did not finish");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(handle.status().await.unwrap(), InstanceStatus::Completed);
        assert_eq!(handle.output().await.unwrap(), json!(["AB", "CD", "EF"]));

        shutdown.cancel();
        while workers.join_next().await.is_some() {}
    }
}
