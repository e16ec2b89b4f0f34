//! Task repository: durable CRUD with soft delete and sync bookkeeping.
//!
//! Every user-visible mutation appends exactly one sync intent, inside the
//! same transaction as the row write. A crash can therefore never leave an
//! acknowledged mutation without its intent, or an intent without its row.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{Result, StoreError, TaskSyncError};
use crate::types::{generate_id, NewTask, Operation, SyncStatus, Task, TaskPatch};

use super::queue::SyncQueue;
use super::traits::{SqlRow, SqlValue, StoreAdapter};
use super::{ts_from_sql, ts_to_sql};

const SELECT_COLS: &str = "SELECT id, title, description, completed, created_at, updated_at, \
     is_deleted, sync_status, server_id, last_synced_at FROM tasks";

/// Durable task CRUD over a store adapter.
pub struct TaskRepository<S: StoreAdapter> {
    store: Arc<S>,
    queue: SyncQueue<S>,
}

impl<S: StoreAdapter> Clone for TaskRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            queue: self.queue.clone(),
        }
    }
}

impl<S: StoreAdapter> TaskRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            queue: SyncQueue::new(Arc::clone(&store)),
            store,
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Create a task and record its `create` intent atomically.
    pub fn create(&self, new: NewTask) -> Result<Task> {
        if new.title.trim().is_empty() {
            return Err(TaskSyncError::EmptyTitle);
        }

        let now = super::now();
        let task = Task {
            id: generate_id(),
            title: new.title,
            description: new.description,
            completed: new.completed,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            sync_status: SyncStatus::Pending,
            server_id: None,
            last_synced_at: None,
        };

        let snapshot = serde_json::to_value(&task)?;
        self.store.transaction(|store| {
            store.run(
                "INSERT INTO tasks \
                 (id, title, description, completed, created_at, updated_at, \
                  is_deleted, sync_status, server_id, last_synced_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                &task_params(&task),
            )?;
            self.queue.enqueue(&task.id, Operation::Create, snapshot)?;
            Ok(())
        })?;

        Ok(task)
    }

    /// Overwrite the mutable fields of a task and record an `update` intent.
    ///
    /// Returns `None` when the task is missing or soft-deleted. The id is
    /// immutable; `TaskPatch` carries no id field.
    pub fn update(&self, id: &str, patch: TaskPatch) -> Result<Option<Task>> {
        let Some(mut task) = self.get(id)? else {
            return Ok(None);
        };

        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }
        task.updated_at = super::now();
        task.sync_status = SyncStatus::Pending;

        let snapshot = serde_json::to_value(&task)?;
        self.store.transaction(|store| {
            store.run(
                "UPDATE tasks SET title = ?1, description = ?2, completed = ?3, \
                 updated_at = ?4, sync_status = ?5 WHERE id = ?6 AND is_deleted = 0",
                &[
                    SqlValue::from(task.title.as_str()),
                    SqlValue::from(task.description.as_str()),
                    SqlValue::from(task.completed),
                    SqlValue::from(ts_to_sql(&task.updated_at)),
                    SqlValue::from(task.sync_status.as_str()),
                    SqlValue::from(id),
                ],
            )?;
            self.queue.enqueue(&task.id, Operation::Update, snapshot)?;
            Ok(())
        })?;

        Ok(Some(task))
    }

    /// Soft-delete a task and record a `delete` intent carrying the final
    /// snapshot. Returns `false` when the task is missing or already deleted.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let Some(mut task) = self.get(id)? else {
            return Ok(false);
        };

        task.is_deleted = true;
        task.updated_at = super::now();
        task.sync_status = SyncStatus::Pending;

        let snapshot = serde_json::to_value(&task)?;
        self.store.transaction(|store| {
            store.run(
                "UPDATE tasks SET is_deleted = 1, updated_at = ?1, sync_status = ?2 \
                 WHERE id = ?3 AND is_deleted = 0",
                &[
                    SqlValue::from(ts_to_sql(&task.updated_at)),
                    SqlValue::from(task.sync_status.as_str()),
                    SqlValue::from(id),
                ],
            )?;
            self.queue.enqueue(&task.id, Operation::Delete, snapshot)?;
            Ok(())
        })?;

        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Fetch a live task. Soft-deleted rows are invisible here.
    pub fn get(&self, id: &str) -> Result<Option<Task>> {
        let row = self.store.get(
            &format!("{SELECT_COLS} WHERE id = ?1 AND is_deleted = 0"),
            &[SqlValue::from(id)],
        )?;
        row.as_ref().map(task_from_row).transpose()
    }

    /// Fetch a task regardless of the soft-delete flag. Conflict resolution
    /// needs the local snapshot even for a deleted row.
    pub fn get_with_deleted(&self, id: &str) -> Result<Option<Task>> {
        let row = self.store.get(
            &format!("{SELECT_COLS} WHERE id = ?1"),
            &[SqlValue::from(id)],
        )?;
        row.as_ref().map(task_from_row).transpose()
    }

    /// All live tasks, most recently updated first.
    pub fn list_all(&self) -> Result<Vec<Task>> {
        let rows = self.store.all(
            &format!("{SELECT_COLS} WHERE is_deleted = 0 ORDER BY updated_at DESC"),
            &[],
        )?;
        rows.iter().map(task_from_row).collect()
    }

    /// Every row awaiting upload, oldest update first. Soft-deleted rows are
    /// visible here; their delete intents still have to reach the server.
    pub fn list_needing_sync(&self) -> Result<Vec<Task>> {
        let rows = self.store.all(
            &format!(
                "{SELECT_COLS} WHERE sync_status IN ('pending', 'error') ORDER BY updated_at ASC"
            ),
            &[],
        )?;
        rows.iter().map(task_from_row).collect()
    }

    // -----------------------------------------------------------------------
    // Sync bookkeeping
    // -----------------------------------------------------------------------

    /// Record a server acknowledgement.
    pub fn mark_synced(
        &self,
        id: &str,
        server_id: Option<&str>,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        match server_id {
            Some(sid) => {
                self.store.run(
                    "UPDATE tasks SET sync_status = 'synced', last_synced_at = ?1, server_id = ?2 \
                     WHERE id = ?3",
                    &[
                        SqlValue::from(ts_to_sql(&synced_at)),
                        SqlValue::from(sid),
                        SqlValue::from(id),
                    ],
                )?;
            }
            None => {
                self.store.run(
                    "UPDATE tasks SET sync_status = 'synced', last_synced_at = ?1 WHERE id = ?2",
                    &[SqlValue::from(ts_to_sql(&synced_at)), SqlValue::from(id)],
                )?;
            }
        }
        Ok(())
    }

    pub fn set_sync_status(&self, id: &str, status: SyncStatus) -> Result<()> {
        self.store.run(
            "UPDATE tasks SET sync_status = ?1 WHERE id = ?2",
            &[SqlValue::from(status.as_str()), SqlValue::from(id)],
        )?;
        Ok(())
    }

    /// Persist a full task row as-is, with no intent. Used to apply the
    /// winning snapshot of a resolved conflict.
    pub fn overwrite(&self, task: &Task) -> Result<()> {
        self.store.run(
            "INSERT OR REPLACE INTO tasks \
             (id, title, description, completed, created_at, updated_at, \
              is_deleted, sync_status, server_id, last_synced_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            &task_params(task),
        )?;
        Ok(())
    }

    /// Reset dangling `in-progress` rows to `pending`. Returns how many rows
    /// were reset. `SqliteStore::initialize` already does this at startup;
    /// hosts with other store lifecycles can call it directly.
    pub fn recover_interrupted(&self) -> Result<usize> {
        self.store.run(
            "UPDATE tasks SET sync_status = 'pending' WHERE sync_status = 'in-progress'",
            &[],
        )
    }

    /// Instant of the most recent successful acknowledgement, if any.
    pub fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        let row = self
            .store
            .get("SELECT MAX(last_synced_at) FROM tasks", &[])?
            .unwrap_or_default();
        match row.first() {
            Some(SqlValue::Text(raw)) => Ok(ts_from_sql(raw)),
            _ => Ok(None),
        }
    }
}

// ============================================================================
// Row projection
// ============================================================================

fn task_params(task: &Task) -> [SqlValue; 10] {
    [
        SqlValue::from(task.id.as_str()),
        SqlValue::from(task.title.as_str()),
        SqlValue::from(task.description.as_str()),
        SqlValue::from(task.completed),
        SqlValue::from(ts_to_sql(&task.created_at)),
        SqlValue::from(ts_to_sql(&task.updated_at)),
        SqlValue::from(task.is_deleted),
        SqlValue::from(task.sync_status.as_str()),
        SqlValue::from(task.server_id.clone()),
        SqlValue::from(task.last_synced_at.as_ref().map(ts_to_sql)),
    ]
}

/// Project a task row back into a `Task`. Total for any row the schema can
/// produce: booleans restore from 0/1, timestamps parse from text, absent
/// server fields map to `None`.
fn task_from_row(row: &SqlRow) -> Result<Task> {
    let sync_status_raw = text_at(row, 7, "sync_status")?;
    let sync_status =
        SyncStatus::parse(&sync_status_raw).ok_or_else(|| corruption(row, "sync_status"))?;

    let server_id = match cell(row, 8) {
        SqlValue::Null => None,
        other => Some(
            other
                .as_text()
                .ok_or_else(|| corruption(row, "server_id"))?
                .to_string(),
        ),
    };

    let last_synced_at = match cell(row, 9) {
        SqlValue::Null => None,
        other => {
            let raw = other
                .as_text()
                .ok_or_else(|| corruption(row, "last_synced_at"))?;
            Some(ts_from_sql(raw).ok_or_else(|| corruption(row, "last_synced_at"))?)
        }
    };

    Ok(Task {
        id: text_at(row, 0, "id")?,
        title: text_at(row, 1, "title")?,
        description: text_at(row, 2, "description")?,
        completed: cell(row, 3)
            .as_integer()
            .ok_or_else(|| corruption(row, "completed"))?
            != 0,
        created_at: ts_from_sql(&text_at(row, 4, "created_at")?)
            .ok_or_else(|| corruption(row, "created_at"))?,
        updated_at: ts_from_sql(&text_at(row, 5, "updated_at")?)
            .ok_or_else(|| corruption(row, "updated_at"))?,
        is_deleted: cell(row, 6)
            .as_integer()
            .ok_or_else(|| corruption(row, "is_deleted"))?
            != 0,
        sync_status,
        server_id,
        last_synced_at,
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

fn corruption(row: &SqlRow, column: &str) -> TaskSyncError {
    StoreError::Corruption {
        table: "tasks".to_string(),
        id: row
            .first()
            .and_then(SqlValue::as_text)
            .unwrap_or("?")
            .to_string(),
        column: column.to_string(),
    }
    .into()
}
