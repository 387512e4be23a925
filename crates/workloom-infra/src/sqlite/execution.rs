//! SQLite execution repository implementation.
//!
//! Implements `ExecutionRepository` from `workloom-core` using sqlx with
//! split read/write pools. Event payloads are stored as JSON blobs alongside
//! a `kind` discriminator and an optional `task_id` used for the
//! duplicate-completion guard.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use workloom_core::repository::ExecutionRepository;
use workloom_types::error::RepositoryError;
use workloom_types::task::ActivityOutcome;
use workloom_types::workflow::{EventKind, InstanceStatus, WorkflowEvent, WorkflowInstance};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ExecutionRepository`.
#[derive(Clone)]
pub struct SqliteExecutionRepository {
    pool: DatabasePool,
}

impl SqliteExecutionRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct InstanceRow {
    id: String,
    workflow_name: String,
    input: String,
    status: String,
    output: Option<String>,
    error: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

impl InstanceRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_name: row.try_get("workflow_name")?,
            input: row.try_get("input")?,
            status: row.try_get("status")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_instance(self) -> Result<WorkflowInstance, RepositoryError> {
        let status: InstanceStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        let input: Value = serde_json::from_str(&self.input)
            .map_err(|e| RepositoryError::Query(format!("invalid input JSON: {e}")))?;

        let output = self
            .output
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid output JSON: {e}")))
            })
            .transpose()?;

        Ok(WorkflowInstance {
            id: parse_uuid(&self.id)?,
            workflow_name: self.workflow_name,
            input,
            status,
            output,
            error: self.error,
            created_at: parse_datetime(&self.created_at)?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

struct EventRow {
    instance_id: String,
    seq: i64,
    payload: String,
    recorded_at: String,
}

impl EventRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            instance_id: row.try_get("instance_id")?,
            seq: row.try_get("seq")?,
            payload: row.try_get("payload")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    fn into_event(self) -> Result<WorkflowEvent, RepositoryError> {
        let kind: EventKind = serde_json::from_str(&self.payload)
            .map_err(|e| RepositoryError::Query(format!("invalid event payload: {e}")))?;
        Ok(WorkflowEvent {
            instance_id: parse_uuid(&self.instance_id)?,
            seq: self.seq as u64,
            kind,
            recorded_at: parse_datetime(&self.recorded_at)?,
        })
    }
}

struct OutcomeRow {
    task_id: String,
    instance_id: String,
    status: String,
    result: Option<String>,
    error: Option<String>,
    attempt: i64,
    finished_at: String,
}

impl OutcomeRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            task_id: row.try_get("task_id")?,
            instance_id: row.try_get("instance_id")?,
            status: row.try_get("status")?,
            result: row.try_get("result")?,
            error: row.try_get("error")?,
            attempt: row.try_get("attempt")?,
            finished_at: row.try_get("finished_at")?,
        })
    }

    fn into_outcome(self) -> Result<ActivityOutcome, RepositoryError> {
        let status = serde_json::from_value(Value::String(self.status.clone()))
            .map_err(|_| RepositoryError::Query(format!("invalid outcome status: {}", self.status)))?;

        let result = self
            .result
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid result JSON: {e}")))
            })
            .transpose()?;

        Ok(ActivityOutcome {
            task_id: parse_uuid(&self.task_id)?,
            instance_id: parse_uuid(&self.instance_id)?,
            status,
            result,
            error: self.error,
            attempt: self.attempt as u32,
            finished_at: parse_datetime(&self.finished_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// ExecutionRepository impl
// ---------------------------------------------------------------------------

impl ExecutionRepository for SqliteExecutionRepository {
    async fn create_instance(&self, instance: &WorkflowInstance) -> Result<(), RepositoryError> {
        let input_json = serde_json::to_string(&instance.input)
            .map_err(|e| RepositoryError::Query(format!("serialize input: {e}")))?;

        sqlx::query(
            r#"INSERT INTO workflow_instances
               (id, workflow_name, input, status, output, error, created_at, completed_at)
               VALUES (?, ?, ?, ?, NULL, NULL, ?, NULL)"#,
        )
        .bind(instance.id.to_string())
        .bind(&instance.workflow_name)
        .bind(input_json)
        .bind(instance.status.as_str())
        .bind(format_datetime(&instance.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_instance(&self, id: &Uuid) -> Result<Option<WorkflowInstance>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, workflow_name, input, status, output, error, created_at, completed_at
             FROM workflow_instances WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        row.map(|r| InstanceRow::from_row(&r).map_err(query_err)?.into_instance())
            .transpose()
    }

    async fn complete_instance(
        &self,
        id: &Uuid,
        output: &Value,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let output_json = serde_json::to_string(output)
            .map_err(|e| RepositoryError::Query(format!("serialize output: {e}")))?;

        let result = sqlx::query(
            "UPDATE workflow_instances
             SET status = 'completed', output = ?, completed_at = ?
             WHERE id = ?",
        )
        .bind(output_json)
        .bind(format_datetime(&completed_at))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn fail_instance(
        &self,
        id: &Uuid,
        error: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE workflow_instances
             SET status = 'failed', error = ?, completed_at = ?
             WHERE id = ?",
        )
        .bind(error)
        .bind(format_datetime(&completed_at))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_instances(&self, limit: u32) -> Result<Vec<WorkflowInstance>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, workflow_name, input, status, output, error, created_at, completed_at
             FROM workflow_instances ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|r| InstanceRow::from_row(r).map_err(query_err)?.into_instance())
            .collect()
    }

    async fn append_event(
        &self,
        instance_id: &Uuid,
        kind: &EventKind,
    ) -> Result<u64, RepositoryError> {
        let payload = serde_json::to_string(kind)
            .map_err(|e| RepositoryError::Query(format!("serialize event: {e}")))?;

        // Single statement keeps the seq allocation atomic on the writer.
        let row = sqlx::query(
            r#"INSERT INTO workflow_events (instance_id, seq, kind, task_id, payload, recorded_at)
               VALUES (
                   ?,
                   (SELECT COALESCE(MAX(seq) + 1, 0) FROM workflow_events WHERE instance_id = ?),
                   ?, ?, ?, ?
               )
               RETURNING seq"#,
        )
        .bind(instance_id.to_string())
        .bind(instance_id.to_string())
        .bind(kind.name())
        .bind(kind.task_id().map(|id| id.to_string()))
        .bind(payload)
        .bind(format_datetime(&Utc::now()))
        .fetch_one(&self.pool.writer)
        .await
        .map_err(query_err)?;

        let seq: i64 = row.try_get("seq").map_err(query_err)?;
        Ok(seq as u64)
    }

    async fn append_activity_completed(
        &self,
        instance_id: &Uuid,
        kind: &EventKind,
    ) -> Result<bool, RepositoryError> {
        let task_id = kind.task_id().ok_or_else(|| {
            RepositoryError::Query("append_activity_completed requires a task id".to_string())
        })?;
        let payload = serde_json::to_string(kind)
            .map_err(|e| RepositoryError::Query(format!("serialize event: {e}")))?;

        // Atomic insert-unless-present: a redelivered terminal outcome must
        // not produce a second completion event for the same task.
        let result = sqlx::query(
            r#"INSERT INTO workflow_events (instance_id, seq, kind, task_id, payload, recorded_at)
               SELECT ?,
                      (SELECT COALESCE(MAX(seq) + 1, 0) FROM workflow_events WHERE instance_id = ?),
                      ?, ?, ?, ?
               WHERE NOT EXISTS (
                   SELECT 1 FROM workflow_events
                   WHERE instance_id = ? AND kind = 'activity_completed' AND task_id = ?
               )"#,
        )
        .bind(instance_id.to_string())
        .bind(instance_id.to_string())
        .bind(kind.name())
        .bind(task_id.to_string())
        .bind(payload)
        .bind(format_datetime(&Utc::now()))
        .bind(instance_id.to_string())
        .bind(task_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_events(&self, instance_id: &Uuid) -> Result<Vec<WorkflowEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT instance_id, seq, payload, recorded_at
             FROM workflow_events WHERE instance_id = ? ORDER BY seq ASC",
        )
        .bind(instance_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|r| EventRow::from_row(r).map_err(query_err)?.into_event())
            .collect()
    }

    async fn record_outcome(&self, outcome: &ActivityOutcome) -> Result<(), RepositoryError> {
        let status = serde_json::to_value(outcome.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| RepositoryError::Query("serialize outcome status".to_string()))?;

        let result_json = outcome
            .result
            .as_ref()
            .map(|v| {
                serde_json::to_string(v)
                    .map_err(|e| RepositoryError::Query(format!("serialize result: {e}")))
            })
            .transpose()?;

        sqlx::query(
            r#"INSERT INTO activity_outcomes
               (task_id, instance_id, status, result, error, attempt, finished_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(task_id) DO UPDATE SET
                 status = excluded.status,
                 result = excluded.result,
                 error = excluded.error,
                 attempt = excluded.attempt,
                 finished_at = excluded.finished_at"#,
        )
        .bind(outcome.task_id.to_string())
        .bind(outcome.instance_id.to_string())
        .bind(status)
        .bind(result_json)
        .bind(outcome.error.as_deref())
        .bind(outcome.attempt as i64)
        .bind(format_datetime(&outcome.finished_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_outcome(&self, task_id: &Uuid) -> Result<Option<ActivityOutcome>, RepositoryError> {
        let row = sqlx::query(
            "SELECT task_id, instance_id, status, result, error, attempt, finished_at
             FROM activity_outcomes WHERE task_id = ?",
        )
        .bind(task_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        row.map(|r| OutcomeRow::from_row(&r).map_err(query_err)?.into_outcome())
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use workloom_types::task::OutcomeStatus;

    async fn repo() -> (SqliteExecutionRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (SqliteExecutionRepository::new(pool), dir)
    }

    fn instance() -> WorkflowInstance {
        WorkflowInstance {
            id: Uuid::now_v7(),
            workflow_name: "image-hash".to_string(),
            input: json!({"fileName": "cat.png"}),
            status: InstanceStatus::Running,
            output: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn instance_roundtrip_and_completion() {
        let (repo, _dir) = repo().await;
        let inst = instance();
        repo.create_instance(&inst).await.unwrap();

        let loaded = repo.get_instance(&inst.id).await.unwrap().unwrap();
        assert_eq!(loaded.workflow_name, "image-hash");
        assert_eq!(loaded.status, InstanceStatus::Running);
        assert_eq!(loaded.input, inst.input);

        repo.complete_instance(&inst.id, &json!({"ok": true}), Utc::now())
            .await
            .unwrap();
        let completed = repo.get_instance(&inst.id).await.unwrap().unwrap();
        assert_eq!(completed.status, InstanceStatus::Completed);
        assert_eq!(completed.output, Some(json!({"ok": true})));
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn fail_unknown_instance_is_not_found() {
        let (repo, _dir) = repo().await;
        let err = repo
            .fail_instance(&Uuid::now_v7(), "boom", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn events_get_sequential_seq_numbers() {
        let (repo, _dir) = repo().await;
        let inst = instance();
        repo.create_instance(&inst).await.unwrap();

        for expected_seq in 0..3u64 {
            let seq = repo
                .append_event(
                    &inst.id,
                    &EventKind::ActivityScheduled {
                        batch: 0,
                        index: expected_seq as u32,
                        task_id: Uuid::now_v7(),
                        activity_name: "compute-hash".to_string(),
                        args: vec![],
                    },
                )
                .await
                .unwrap();
            assert_eq!(seq, expected_seq);
        }

        let events = repo.list_events(&inst.id).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].seq, 2);
    }

    #[tokio::test]
    async fn duplicate_completion_is_rejected() {
        let (repo, _dir) = repo().await;
        let inst = instance();
        repo.create_instance(&inst).await.unwrap();

        let task_id = Uuid::now_v7();
        repo.append_event(
            &inst.id,
            &EventKind::ActivityScheduled {
                batch: 0,
                index: 0,
                task_id,
                activity_name: "compute-hash".to_string(),
                args: vec![],
            },
        )
        .await
        .unwrap();

        let completion = EventKind::ActivityCompleted {
            task_id,
            status: OutcomeStatus::Success,
            result: Some(json!("digest")),
            error: None,
            attempt: 1,
        };
        assert!(repo.append_activity_completed(&inst.id, &completion).await.unwrap());
        assert!(!repo.append_activity_completed(&inst.id, &completion).await.unwrap());

        let events = repo.list_events(&inst.id).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn outcome_upsert_keeps_latest_attempt() {
        let (repo, _dir) = repo().await;
        let task_id = Uuid::now_v7();
        let instance_id = Uuid::now_v7();

        let first = ActivityOutcome {
            task_id,
            instance_id,
            status: OutcomeStatus::Failed,
            result: None,
            error: Some("attempt 1 failed".to_string()),
            attempt: 1,
            finished_at: Utc::now(),
        };
        repo.record_outcome(&first).await.unwrap();

        let second = ActivityOutcome {
            status: OutcomeStatus::Success,
            result: Some(json!("digest")),
            error: None,
            attempt: 2,
            ..first
        };
        repo.record_outcome(&second).await.unwrap();

        let loaded = repo.get_outcome(&task_id).await.unwrap().unwrap();
        assert_eq!(loaded.attempt, 2);
        assert_eq!(loaded.status, OutcomeStatus::Success);
        assert_eq!(loaded.result, Some(json!("digest")));
        assert!(loaded.error.is_none());
    }

    #[tokio::test]
    async fn list_instances_newest_first() {
        let (repo, _dir) = repo().await;
        let first = instance();
        repo.create_instance(&first).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = instance();
        repo.create_instance(&second).await.unwrap();

        let listed = repo.list_instances(10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
    }
}
