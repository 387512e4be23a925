//! SQLite-backed durable queue.
//!
//! At-least-once delivery with lease-based redelivery: dequeue claims a row
//! by stamping a lease expiry instead of deleting it, and `ack` deletes the
//! row. A crashed worker simply lets the lease lapse and the message comes
//! back. On the workflow channel a row is only claimable when no sibling
//! row for the same instance currently holds a live lease, which enforces
//! the at-most-one-drive-pass-per-instance contract.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::Row;
use uuid::Uuid;

use workloom_core::queue::{Delivery, DurableQueue, QueueMessage, WORKFLOW_CHANNEL};
use workloom_types::error::QueueError;

use super::pool::DatabasePool;

/// Default lease duration; generous enough to cover the longest activity
/// timeout plus persistence.
pub const DEFAULT_LEASE_SECS: u64 = 60;

/// SQLite implementation of `DurableQueue`.
#[derive(Clone)]
pub struct SqliteQueue {
    pool: DatabasePool,
    lease_secs: u64,
}

impl SqliteQueue {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool, lease_secs: DEFAULT_LEASE_SECS }
    }

    pub fn with_lease_secs(pool: DatabasePool, lease_secs: u64) -> Self {
        Self { pool, lease_secs: lease_secs.max(1) }
    }

    fn backend_err(e: sqlx::Error) -> QueueError {
        QueueError::Backend(e.to_string())
    }
}

impl DurableQueue for SqliteQueue {
    async fn enqueue(&self, channel: &str, message: &QueueMessage) -> Result<(), QueueError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| QueueError::Payload(e.to_string()))?;

        sqlx::query(
            "INSERT INTO queue_tasks (id, channel, instance_id, payload, enqueued_at, lease_expires_at)
             VALUES (?, ?, ?, ?, ?, NULL)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(channel)
        .bind(message.instance_id().to_string())
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(Self::backend_err)?;

        Ok(())
    }

    async fn dequeue(&self, channel: &str) -> Result<Option<Delivery>, QueueError> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let lease = (now + ChronoDuration::seconds(self.lease_secs as i64)).to_rfc3339();

        // Claim-by-update in one statement so concurrent workers can never
        // grab the same row. The workflow channel additionally refuses rows
        // whose instance already has a live lease on a sibling row.
        let sql = if channel == WORKFLOW_CHANNEL {
            r#"UPDATE queue_tasks
               SET lease_expires_at = ?
               WHERE id = (
                   SELECT q.id FROM queue_tasks q
                   WHERE q.channel = ?
                     AND (q.lease_expires_at IS NULL OR q.lease_expires_at <= ?)
                     AND NOT EXISTS (
                         SELECT 1 FROM queue_tasks w
                         WHERE w.channel = q.channel
                           AND w.instance_id = q.instance_id
                           AND w.id != q.id
                           AND w.lease_expires_at IS NOT NULL
                           AND w.lease_expires_at > ?
                     )
                   ORDER BY q.enqueued_at, q.id
                   LIMIT 1
               )
               RETURNING id, payload"#
        } else {
            r#"UPDATE queue_tasks
               SET lease_expires_at = ?
               WHERE id = (
                   SELECT q.id FROM queue_tasks q
                   WHERE q.channel = ?
                     AND (q.lease_expires_at IS NULL OR q.lease_expires_at <= ?)
                   ORDER BY q.enqueued_at, q.id
                   LIMIT 1
               )
               RETURNING id, payload"#
        };

        let mut query = sqlx::query(sql).bind(&lease).bind(channel).bind(&now_str);
        if channel == WORKFLOW_CHANNEL {
            query = query.bind(&now_str);
        }

        let row = query
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(Self::backend_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.try_get("id").map_err(Self::backend_err)?;
        let payload: String = row.try_get("payload").map_err(Self::backend_err)?;

        let receipt = id
            .parse::<Uuid>()
            .map_err(|e| QueueError::Payload(format!("invalid receipt id: {e}")))?;
        let message: QueueMessage = serde_json::from_str(&payload)
            .map_err(|e| QueueError::Payload(e.to_string()))?;

        Ok(Some(Delivery { receipt, message }))
    }

    async fn ack(&self, receipt: &Uuid) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM queue_tasks WHERE id = ?")
            .bind(receipt.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(Self::backend_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
