//! Sync queue: a durable, append-only log of sync intents.
//!
//! The queue is a passive log. It schedules nothing itself; the engine reads
//! it chronologically and settles items, and the repository appends to it
//! inside the same transaction as the row mutation that caused the intent.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::types::{generate_id, Operation, QueueItem};

use super::traits::{SqlRow, SqlValue, StoreAdapter};
use super::{ts_from_sql, ts_to_sql};

const SELECT_COLS: &str =
    "SELECT id, task_id, operation, data, created_at, retry_count, error_message FROM sync_queue";

/// Append-only intent log over a store adapter.
pub struct SyncQueue<S: StoreAdapter> {
    store: Arc<S>,
}

impl<S: StoreAdapter> Clone for SyncQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: StoreAdapter> SyncQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append a new intent with `retry_count = 0`.
    pub fn enqueue(&self, task_id: &str, operation: Operation, snapshot: Value) -> Result<QueueItem> {
        let item = QueueItem {
            id: generate_id(),
            task_id: task_id.to_string(),
            operation,
            data: snapshot,
            created_at: super::now(),
            retry_count: 0,
            error_message: None,
        };

        let data = serde_json::to_string(&item.data)?;
        self.store.run(
            "INSERT INTO sync_queue (id, task_id, operation, data, created_at, retry_count, error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            &[
                SqlValue::from(item.id.as_str()),
                SqlValue::from(item.task_id.as_str()),
                SqlValue::from(item.operation.as_str()),
                SqlValue::from(data),
                SqlValue::from(ts_to_sql(&item.created_at)),
                SqlValue::from(item.retry_count),
                SqlValue::Null,
            ],
        )?;
        Ok(item)
    }

    /// All items, grouped by task and chronological within each group.
    ///
    /// The rowid tiebreak keeps same-instant intents in insertion order, so
    /// per-task mutation order survives timestamp resolution limits.
    pub fn drain_chronological(&self) -> Result<Vec<QueueItem>> {
        let rows = self.store.all(
            &format!("{SELECT_COLS} ORDER BY task_id, created_at, rowid"),
            &[],
        )?;
        rows.iter().map(item_from_row).collect()
    }

    /// Items for one task, chronological.
    pub fn items_for_task(&self, task_id: &str) -> Result<Vec<QueueItem>> {
        let rows = self.store.all(
            &format!("{SELECT_COLS} WHERE task_id = ?1 ORDER BY created_at, rowid"),
            &[SqlValue::from(task_id)],
        )?;
        rows.iter().map(item_from_row).collect()
    }

    /// Record a failed attempt. Returns whether the item still existed.
    pub fn bump_retry(&self, item_id: &str, new_count: u32, error_message: &str) -> Result<bool> {
        let affected = self.store.run(
            "UPDATE sync_queue SET retry_count = ?1, error_message = ?2 WHERE id = ?3",
            &[
                SqlValue::from(new_count),
                SqlValue::from(error_message),
                SqlValue::from(item_id),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Remove a single item.
    pub fn remove(&self, item_id: &str) -> Result<()> {
        self.store.run(
            "DELETE FROM sync_queue WHERE id = ?1",
            &[SqlValue::from(item_id)],
        )?;
        Ok(())
    }

    /// Remove every item recorded for a task. Returns how many were removed.
    pub fn remove_for_task(&self, task_id: &str) -> Result<usize> {
        self.store.run(
            "DELETE FROM sync_queue WHERE task_id = ?1",
            &[SqlValue::from(task_id)],
        )
    }

    /// Number of intents awaiting upload.
    pub fn count_pending(&self) -> Result<usize> {
        let row = self
            .store
            .get("SELECT COUNT(*) FROM sync_queue", &[])?
            .unwrap_or_default();
        Ok(row
            .first()
            .and_then(SqlValue::as_integer)
            .unwrap_or(0)
            .max(0) as usize)
    }
}

/// Project a queue row back into a `QueueItem`.
fn item_from_row(row: &SqlRow) -> Result<QueueItem> {
    let id = text_at(row, 0, "id")?;

    let operation_raw = text_at(row, 2, "operation")?;
    let operation =
        Operation::parse(&operation_raw).ok_or_else(|| corruption(row, "operation"))?;

    let data: Value = serde_json::from_str(&text_at(row, 3, "data")?)
        .map_err(|_| corruption(row, "data"))?;

    let created_at = ts_from_sql(&text_at(row, 4, "created_at")?)
        .ok_or_else(|| corruption(row, "created_at"))?;

    let retry_count = cell(row, 5)
        .as_integer()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| corruption(row, "retry_count"))?;

    let error_message = match cell(row, 6) {
        SqlValue::Null => None,
        other => Some(
            other
                .as_text()
                .ok_or_else(|| corruption(row, "error_message"))?
                .to_string(),
        ),
    };

    Ok(QueueItem {
        id,
        task_id: text_at(row, 1, "task_id")?,
        operation,
        data,
        created_at,
        retry_count,
        error_message,
    })
}

fn cell(row: &SqlRow, idx: usize) -> &SqlValue {
    row.get(idx).unwrap_or(&SqlValue::Null)
}

fn text_at(row: &SqlRow, idx: usize, column: &str) -> Result<String> {
    cell(row, idx)
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| corruption(row, column))
}

fn corruption(row: &SqlRow, column: &str) -> crate::error::TaskSyncError {
    StoreError::Corruption {
        table: "sync_queue".to_string(),
        id: row
            .first()
            .and_then(SqlValue::as_text)
            .unwrap_or("?")
            .to_string(),
        column: column.to_string(),
    }
    .into()
}
