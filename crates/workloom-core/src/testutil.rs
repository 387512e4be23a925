//! In-memory fakes for the repository and queue ports, used by unit tests
//! across this crate. Both are deliberately simple: a `Mutex` around plain
//! maps, no lease expiry (tests ack explicitly or let messages sit).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use workloom_types::error::{QueueError, RepositoryError};
use workloom_types::task::ActivityOutcome;
use workloom_types::workflow::{EventKind, InstanceStatus, WorkflowEvent, WorkflowInstance};

use crate::queue::{Delivery, DurableQueue, QueueMessage, WORKFLOW_CHANNEL};
use crate::repository::ExecutionRepository;

// ---------------------------------------------------------------------------
// MemoryRepository
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RepoInner {
    instances: HashMap<Uuid, WorkflowInstance>,
    events: HashMap<Uuid, Vec<WorkflowEvent>>,
    outcomes: HashMap<Uuid, ActivityOutcome>,
}

#[derive(Clone, Default)]
pub struct MemoryRepository {
    inner: Arc<Mutex<RepoInner>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of history events for an instance (test assertions).
    pub fn event_count(&self, instance_id: &Uuid) -> usize {
        self.inner
            .lock()
            .unwrap()
            .events
            .get(instance_id)
            .map_or(0, Vec::len)
    }
}

impl ExecutionRepository for MemoryRepository {
    async fn create_instance(&self, instance: &WorkflowInstance) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.instances.contains_key(&instance.id) {
            return Err(RepositoryError::Conflict(format!(
                "instance {} already exists",
                instance.id
            )));
        }
        inner.instances.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn get_instance(&self, id: &Uuid) -> Result<Option<WorkflowInstance>, RepositoryError> {
        Ok(self.inner.lock().unwrap().instances.get(id).cloned())
    }

    async fn complete_instance(
        &self,
        id: &Uuid,
        output: &Value,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let instance = inner
            .instances
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        instance.status = InstanceStatus::Completed;
        instance.output = Some(output.clone());
        instance.completed_at = Some(completed_at);
        Ok(())
    }

    async fn fail_instance(
        &self,
        id: &Uuid,
        error: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let instance = inner
            .instances
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        instance.status = InstanceStatus::Failed;
        instance.error = Some(error.to_string());
        instance.completed_at = Some(completed_at);
        Ok(())
    }

    async fn list_instances(&self, limit: u32) -> Result<Vec<WorkflowInstance>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        let mut all: Vec<WorkflowInstance> = inner.instances.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn append_event(
        &self,
        instance_id: &Uuid,
        kind: &EventKind,
    ) -> Result<u64, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let events = inner.events.entry(*instance_id).or_default();
        let seq = events.len() as u64;
        events.push(WorkflowEvent {
            instance_id: *instance_id,
            seq,
            kind: kind.clone(),
            recorded_at: Utc::now(),
        });
        Ok(seq)
    }

    async fn append_activity_completed(
        &self,
        instance_id: &Uuid,
        kind: &EventKind,
    ) -> Result<bool, RepositoryError> {
        let task_id = kind.task_id().ok_or_else(|| {
            RepositoryError::Query("append_activity_completed requires a task id".to_string())
        })?;
        let mut inner = self.inner.lock().unwrap();
        let events = inner.events.entry(*instance_id).or_default();
        let duplicate = events.iter().any(|e| {
            matches!(&e.kind, EventKind::ActivityCompleted { .. }) && e.kind.task_id() == Some(task_id)
        });
        if duplicate {
            return Ok(false);
        }
        let seq = events.len() as u64;
        events.push(WorkflowEvent {
            instance_id: *instance_id,
            seq,
            kind: kind.clone(),
            recorded_at: Utc::now(),
        });
        Ok(true)
    }

    async fn list_events(&self, instance_id: &Uuid) -> Result<Vec<WorkflowEvent>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .events
            .get(instance_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_outcome(&self, outcome: &ActivityOutcome) -> Result<(), RepositoryError> {
        self.inner
            .lock()
            .unwrap()
            .outcomes
            .insert(outcome.task_id, outcome.clone());
        Ok(())
    }

    async fn get_outcome(&self, task_id: &Uuid) -> Result<Option<ActivityOutcome>, RepositoryError> {
        Ok(self.inner.lock().unwrap().outcomes.get(task_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryQueue
// ---------------------------------------------------------------------------

#[derive(Default)]
struct QueueInner {
    channels: HashMap<String, VecDeque<(Uuid, QueueMessage)>>,
    in_flight: HashMap<Uuid, (String, QueueMessage)>,
}

#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued (not in-flight) messages on a channel.
    pub fn depth(&self, channel: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .channels
            .get(channel)
            .map_or(0, VecDeque::len)
    }
}

impl DurableQueue for MemoryQueue {
    async fn enqueue(&self, channel: &str, message: &QueueMessage) -> Result<(), QueueError> {
        self.inner
            .lock()
            .unwrap()
            .channels
            .entry(channel.to_string())
            .or_default()
            .push_back((Uuid::now_v7(), message.clone()));
        Ok(())
    }

    async fn dequeue(&self, channel: &str) -> Result<Option<Delivery>, QueueError> {
        let mut inner = self.inner.lock().unwrap();

        // Workflow channel: at most one in-flight delivery per instance.
        let blocked: Vec<Uuid> = if channel == WORKFLOW_CHANNEL {
            inner
                .in_flight
                .values()
                .filter(|(ch, _)| ch == WORKFLOW_CHANNEL)
                .map(|(_, msg)| msg.instance_id())
                .collect()
        } else {
            Vec::new()
        };

        let queue = inner.channels.entry(channel.to_string()).or_default();
        let position = queue
            .iter()
            .position(|(_, msg)| !blocked.contains(&msg.instance_id()));
        let Some(position) = position else {
            return Ok(None);
        };
        let (receipt, message) = queue.remove(position).expect("position is valid");
        inner
            .in_flight
            .insert(receipt, (channel.to_string(), message.clone()));
        Ok(Some(Delivery { receipt, message }))
    }

    async fn ack(&self, receipt: &Uuid) -> Result<(), QueueError> {
        self.inner.lock().unwrap().in_flight.remove(receipt);
        Ok(())
    }
}
