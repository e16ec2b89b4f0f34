//! Dead-letter quarantine: terminal destination for exhausted intents.
//!
//! Insert-only, keyed by the original queue item id. Reads are newest-first
//! for operator diagnostics; entries are never resurrected.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::types::{DeadLetter, Operation, QueueItem};

use super::traits::{SqlRow, SqlValue, StoreAdapter};
use super::{ts_from_sql, ts_to_sql};

/// Insert-only quarantine over a store adapter.
pub struct DeadLetterStore<S: StoreAdapter> {
    store: Arc<S>,
}

impl<S: StoreAdapter> Clone for DeadLetterStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: StoreAdapter> DeadLetterStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Quarantine an intent verbatim, with the failure instant and the last
    /// observed error.
    pub fn insert(
        &self,
        item: &QueueItem,
        failed_at: DateTime<Utc>,
        final_error: &str,
    ) -> Result<DeadLetter> {
        let record = DeadLetter {
            id: item.id.clone(),
            task_id: item.task_id.clone(),
            operation: item.operation,
            data: item.data.clone(),
            created_at: item.created_at,
            retry_count: item.retry_count,
            failed_at,
            final_error_message: final_error.to_string(),
        };

        let data = serde_json::to_string(&record.data)?;
        self.store.run(
            "INSERT INTO dead_letter_queue \
             (id, task_id, operation, data, created_at, retry_count, failed_at, final_error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            &[
                SqlValue::from(record.id.as_str()),
                SqlValue::from(record.task_id.as_str()),
                SqlValue::from(record.operation.as_str()),
                SqlValue::from(data),
                SqlValue::from(ts_to_sql(&record.created_at)),
                SqlValue::from(record.retry_count),
                SqlValue::from(ts_to_sql(&record.failed_at)),
                SqlValue::from(record.final_error_message.as_str()),
            ],
        )?;
        Ok(record)
    }

    /// Every quarantined intent, newest failures first.
    pub fn all(&self) -> Result<Vec<DeadLetter>> {
        let rows = self.store.all(
            "SELECT id, task_id, operation, data, created_at, retry_count, failed_at, final_error_message \
             FROM dead_letter_queue ORDER BY failed_at DESC, rowid DESC",
            &[],
        )?;
        rows.iter().map(record_from_row).collect()
    }

    pub fn count(&self) -> Result<usize> {
        let row = self
            .store
            .get("SELECT COUNT(*) FROM dead_letter_queue", &[])?
            .unwrap_or_default();
        Ok(row
            .first()
            .and_then(SqlValue::as_integer)
            .unwrap_or(0)
            .max(0) as usize)
    }
}

fn record_from_row(row: &SqlRow) -> Result<DeadLetter> {
    let operation_raw = text_at(row, 2, "operation")?;
    let operation =
        Operation::parse(&operation_raw).ok_or_else(|| corruption(row, "operation"))?;

    let data: Value = serde_json::from_str(&text_at(row, 3, "data")?)
        .map_err(|_| corruption(row, "data"))?;

    Ok(DeadLetter {
        id: text_at(row, 0, "id")?,
        task_id: text_at(row, 1, "task_id")?,
        operation,
        data,
        created_at: ts_from_sql(&text_at(row, 4, "created_at")?)
            .ok_or_else(|| corruption(row, "created_at"))?,
        retry_count: row
            .get(5)
            .and_then(SqlValue::as_integer)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| corruption(row, "retry_count"))?,
        failed_at: ts_from_sql(&text_at(row, 6, "failed_at")?)
            .ok_or_else(|| corruption(row, "failed_at"))?,
        final_error_message: text_at(row, 7, "final_error_message")?,
    })
}

fn text_at(row: &SqlRow, idx: usize, column: &str) -> Result<String> {
    row.get(idx)
        .and_then(SqlValue::as_text)
        .map(str::to_string)
        .ok_or_else(|| corruption(row, column))
}

fn corruption(row: &SqlRow, column: &str) -> crate::error::TaskSyncError {
    StoreError::Corruption {
        table: "dead_letter_queue".to_string(),
        id: row
            .first()
            .and_then(SqlValue::as_text)
            .unwrap_or("?")
            .to_string(),
        column: column.to_string(),
    }
    .into()
}
