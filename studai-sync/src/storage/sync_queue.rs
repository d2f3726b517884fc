//! Operation queue
//!
//! Append-only replay log of note mutations the server has not confirmed.
//! Entries replay in `queue_id` order and leave the log only through an
//! explicit acknowledgment after a successful replay.
//!
//! The queue also remembers which server id each temp id resolved to, so
//! operations that outlive the drain pass of their create stay resolvable.

use crate::database::{NoteId, PendingOperation, QueuedOperation};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{FromRow, SqlitePool};
use std::collections::{HashMap, HashSet};

#[derive(FromRow)]
struct QueueRow {
    queue_id: i64,
    op_type: String,
    data: String,
    timestamp: DateTime<Utc>,
}

impl TryFrom<QueueRow> for QueuedOperation {
    type Error = crate::error::SyncError;

    fn try_from(row: QueueRow) -> Result<Self> {
        let data: serde_json::Value = serde_json::from_str(&row.data)?;
        let operation = serde_json::from_value(json!({ "type": row.op_type, "data": data }))?;

        Ok(QueuedOperation {
            queue_id: row.queue_id,
            operation,
            timestamp: row.timestamp,
        })
    }
}

/// Persistent FIFO of pending operations
#[derive(Clone)]
pub struct OperationQueue {
    pool: SqlitePool,
}

impl OperationQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an operation, returning its `queue_id`
    pub async fn queue_operation(&self, operation: &PendingOperation) -> Result<i64> {
        let value = serde_json::to_value(operation)?;
        let data = serde_json::to_string(&value["data"])?;

        let queue_id = sqlx::query(
            r#"
            INSERT INTO sync_queue (op_type, data, timestamp)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(operation.kind())
        .bind(data)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        tracing::debug!("Queued {} operation #{}", operation.kind(), queue_id);
        Ok(queue_id)
    }

    /// Every queued row in replay order, decoded one by one.
    ///
    /// A row that no longer decodes is returned as an error next to its
    /// `queue_id` instead of failing the whole read.
    pub async fn get_pending_entries(&self) -> Result<Vec<(i64, Result<QueuedOperation>)>> {
        let rows = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT queue_id, op_type, data, timestamp
            FROM sync_queue
            ORDER BY queue_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.queue_id, QueuedOperation::try_from(row)))
            .collect())
    }

    /// Decodable queued operations in replay order
    pub async fn get_pending_operations(&self) -> Result<Vec<QueuedOperation>> {
        let operations = self
            .get_pending_entries()
            .await?
            .into_iter()
            .filter_map(|(queue_id, entry)| match entry {
                Ok(queued) => Some(queued),
                Err(e) => {
                    tracing::warn!("Skipping undecodable operation #{}: {}", queue_id, e);
                    None
                }
            })
            .collect();

        Ok(operations)
    }

    /// Acknowledge a replayed operation.
    ///
    /// Returns false when the entry was already gone.
    pub async fn remove_synced_operation(&self, queue_id: i64) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM sync_queue WHERE queue_id = ?")
            .bind(queue_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::debug!("Removed synced operation #{}", queue_id);
        Ok(removed > 0)
    }

    /// Empty the queue unconditionally
    pub async fn clear_sync_queue(&self) -> Result<u64> {
        let removed = sqlx::query("DELETE FROM sync_queue")
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!("Cleared sync queue ({} operations dropped)", removed);
        Ok(removed)
    }

    /// Number of queued operations
    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Drop every queued create and temp update of a note that never reached the server
    pub async fn remove_operations_for_temp(&self, temp_id: &str) -> Result<u64> {
        let removed = sqlx::query(
            r#"
            DELETE FROM sync_queue
            WHERE op_type IN ('CREATE', 'UPDATE_TEMP')
              AND json_extract(data, '$.temp_id') = ?
            "#,
        )
        .bind(temp_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        tracing::debug!("Dropped {} queued operations for {}", removed, temp_id);
        Ok(removed)
    }

    /// Drop queued updates and deletes aimed at a server id, including temp
    /// updates of notes that were created as that id
    pub async fn remove_operations_for_note(&self, real_id: i64) -> Result<u64> {
        let removed = sqlx::query(
            r#"
            DELETE FROM sync_queue
            WHERE (op_type IN ('UPDATE', 'DELETE')
                   AND json_type(data, '$.note_id') = 'integer'
                   AND json_extract(data, '$.note_id') = ?)
               OR (op_type = 'UPDATE_TEMP'
                   AND json_extract(data, '$.temp_id') IN
                       (SELECT temp_id FROM id_mappings WHERE real_id = ?))
            "#,
        )
        .bind(real_id)
        .bind(real_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        tracing::debug!("Dropped {} queued operations for note {}", removed, real_id);
        Ok(removed)
    }

    /// Whether an update of this server id is still waiting to replay
    pub async fn has_queued_update(&self, real_id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sync_queue
            WHERE (op_type = 'UPDATE'
                   AND json_type(data, '$.note_id') = 'integer'
                   AND json_extract(data, '$.note_id') = ?)
               OR (op_type = 'UPDATE_TEMP'
                   AND json_extract(data, '$.temp_id') IN
                       (SELECT temp_id FROM id_mappings WHERE real_id = ?))
            "#,
        )
        .bind(real_id)
        .bind(real_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Server ids that have a delete waiting in the queue
    pub async fn pending_delete_ids(&self) -> Result<HashSet<i64>> {
        let ids = self
            .get_pending_operations()
            .await?
            .into_iter()
            .filter_map(|queued| match queued.operation {
                PendingOperation::Delete {
                    note_id: NoteId::Confirmed(id),
                } => Some(id),
                _ => None,
            })
            .collect();

        Ok(ids)
    }

    /// Remember the server id a temp id was created as
    pub async fn record_resolution(&self, temp_id: &str, real_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO id_mappings (temp_id, real_id, resolved_at) VALUES (?, ?, ?)
            ON CONFLICT(temp_id) DO UPDATE SET
                real_id = excluded.real_id,
                resolved_at = excluded.resolved_at
            "#,
        )
        .bind(temp_id)
        .bind(real_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::debug!("Resolved {} -> {}", temp_id, real_id);
        Ok(())
    }

    pub async fn resolve_temp_id(&self, temp_id: &str) -> Result<Option<i64>> {
        let real_id: Option<i64> =
            sqlx::query_scalar("SELECT real_id FROM id_mappings WHERE temp_id = ?")
                .bind(temp_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(real_id)
    }

    /// Forget resolutions recorded before `cutoff` that no queued operation refers to
    pub async fn prune_resolutions(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let removed = sqlx::query(
            r#"
            DELETE FROM id_mappings
            WHERE resolved_at < ?
              AND temp_id NOT IN (
                  SELECT json_extract(data, '$.temp_id') FROM sync_queue
                  WHERE op_type IN ('CREATE', 'UPDATE_TEMP')
                    AND json_extract(data, '$.temp_id') IS NOT NULL
                  UNION
                  SELECT json_extract(data, '$.note_id') FROM sync_queue
                  WHERE op_type IN ('UPDATE', 'DELETE')
                    AND json_type(data, '$.note_id') = 'text'
              )
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if removed > 0 {
            tracing::debug!("Pruned {} temp id resolutions", removed);
        }
        Ok(removed)
    }

    /// Every known temp id resolution
    pub async fn resolutions(&self) -> Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT temp_id, real_id FROM id_mappings")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().collect())
    }
}
