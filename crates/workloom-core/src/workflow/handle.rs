//! Client-facing workflow handles.
//!
//! `WorkflowClient` is the entry point for code outside the engines: it
//! starts new instances, attaches to existing ones, and reads status/output.
//! It shares the repository and queue with the workers but never drives a
//! workflow itself -- starting an instance just persists the initial row and
//! enqueues the first workflow task.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use workloom_types::error::{QueueError, RepositoryError, WorkflowError};
use workloom_types::workflow::{InstanceStatus, WorkflowInstance};

use crate::queue::{DurableQueue, QueueMessage, WORKFLOW_CHANNEL};
use crate::registry::WorkflowRegistry;
use crate::repository::ExecutionRepository;

// ---------------------------------------------------------------------------
// HandleError
// ---------------------------------------------------------------------------

/// Errors surfaced to client code using the handle API.
#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

// ---------------------------------------------------------------------------
// WorkflowClient
// ---------------------------------------------------------------------------

/// Starts and inspects workflow instances.
pub struct WorkflowClient<R, Q> {
    repo: R,
    queue: Q,
    workflows: WorkflowRegistry,
}

impl<R: Clone, Q: Clone> Clone for WorkflowClient<R, Q> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            queue: self.queue.clone(),
            workflows: self.workflows.clone(),
        }
    }
}

impl<R, Q> WorkflowClient<R, Q>
where
    R: ExecutionRepository + Clone,
    Q: DurableQueue + Clone,
{
    pub fn new(repo: R, queue: Q, workflows: WorkflowRegistry) -> Self {
        Self { repo, queue, workflows }
    }

    /// Prepare a handle for starting a new instance of a registered workflow.
    pub fn make(&self, workflow_name: &str) -> Result<PendingWorkflow<R, Q>, HandleError> {
        if !self.workflows.contains(workflow_name) {
            return Err(WorkflowError::UnknownWorkflow(workflow_name.to_string()).into());
        }
        Ok(PendingWorkflow {
            client: self.clone(),
            workflow_name: workflow_name.to_string(),
        })
    }

    /// Attach to an existing instance without re-starting it.
    pub async fn load(
        &self,
        instance_id: Uuid,
        workflow_name: &str,
    ) -> Result<WorkflowHandle<R, Q>, HandleError> {
        let instance = self
            .repo
            .get_instance(&instance_id)
            .await?
            .ok_or(WorkflowError::InstanceNotFound(instance_id))?;

        if instance.workflow_name != workflow_name {
            return Err(WorkflowError::NameMismatch {
                id: instance_id,
                actual: instance.workflow_name,
                requested: workflow_name.to_string(),
            }
            .into());
        }

        Ok(WorkflowHandle {
            client: self.clone(),
            instance_id,
        })
    }

    /// Allocate an instance, persist its initial state, and enqueue the
    /// first workflow task.
    pub(crate) async fn start(
        &self,
        workflow_name: &str,
        input: Value,
    ) -> Result<WorkflowHandle<R, Q>, HandleError> {
        let instance_id = Uuid::now_v7();
        let instance = WorkflowInstance {
            id: instance_id,
            workflow_name: workflow_name.to_string(),
            input,
            status: InstanceStatus::Running,
            output: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        self.repo.create_instance(&instance).await?;
        self.queue
            .enqueue(WORKFLOW_CHANNEL, &QueueMessage::Workflow { instance_id })
            .await?;

        tracing::info!(
            instance_id = %instance_id,
            workflow = workflow_name,
            "workflow instance started"
        );

        Ok(WorkflowHandle {
            client: self.clone(),
            instance_id,
        })
    }

    /// Current status of an instance.
    pub async fn status(&self, instance_id: Uuid) -> Result<InstanceStatus, HandleError> {
        Ok(self.instance(instance_id).await?.status)
    }

    /// Final output of a completed instance.
    pub async fn output(&self, instance_id: Uuid) -> Result<Value, HandleError> {
        let instance = self.instance(instance_id).await?;
        if instance.status != InstanceStatus::Completed {
            return Err(WorkflowError::NotCompleted(instance_id).into());
        }
        instance.output.ok_or_else(|| {
            RepositoryError::Query(format!("completed instance {instance_id} has no output")).into()
        })
    }

    /// Full instance record.
    pub async fn instance(&self, instance_id: Uuid) -> Result<WorkflowInstance, HandleError> {
        self.repo
            .get_instance(&instance_id)
            .await?
            .ok_or_else(|| WorkflowError::InstanceNotFound(instance_id).into())
    }

    /// Recent instances, newest first.
    pub async fn list(&self, limit: u32) -> Result<Vec<WorkflowInstance>, HandleError> {
        Ok(self.repo.list_instances(limit).await?)
    }
}

// ---------------------------------------------------------------------------
// PendingWorkflow / WorkflowHandle
// ---------------------------------------------------------------------------

/// A validated-but-unstarted workflow, produced by `WorkflowClient::make`.
pub struct PendingWorkflow<R, Q> {
    client: WorkflowClient<R, Q>,
    workflow_name: String,
}

impl<R, Q> std::fmt::Debug for PendingWorkflow<R, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingWorkflow")
            .field("workflow_name", &self.workflow_name)
            .finish_non_exhaustive()
    }
}

impl<R, Q> PendingWorkflow<R, Q>
where
    R: ExecutionRepository + Clone,
    Q: DurableQueue + Clone,
{
    /// Start a new instance with the given input.
    pub async fn start(self, input: Value) -> Result<WorkflowHandle<R, Q>, HandleError> {
        self.client.start(&self.workflow_name, input).await
    }
}

/// A handle attached to one workflow instance.
pub struct WorkflowHandle<R, Q> {
    client: WorkflowClient<R, Q>,
    instance_id: Uuid,
}

impl<R, Q> std::fmt::Debug for WorkflowHandle<R, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowHandle")
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

impl<R, Q> WorkflowHandle<R, Q>
where
    R: ExecutionRepository + Clone,
    Q: DurableQueue + Clone,
{
    pub fn id(&self) -> Uuid {
        self.instance_id
    }

    pub async fn status(&self) -> Result<InstanceStatus, HandleError> {
        self.client.status(self.instance_id).await
    }

    pub async fn output(&self) -> Result<Value, HandleError> {
        self.client.output(self.instance_id).await
    }

    pub async fn instance(&self) -> Result<WorkflowInstance, HandleError> {
        self.client.instance(self.instance_id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
