//! SQLite store adapter.
//!
//! Implements `StoreAdapter` using rusqlite (bundled). A reentrant lock
//! guards the connection: a transaction keeps it held while the closure it
//! runs issues further statements through the same store.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::ReentrantMutex;
use rusqlite::params_from_iter;
use rusqlite::types::ValueRef;
use tracing::info;

use crate::error::{Result, StoreError, TaskSyncError};

use super::traits::{SqlRow, SqlValue, StoreAdapter};

// ============================================================================
// Value helpers
// ============================================================================

/// Convert a `SqlValue` to a `rusqlite::types::Value` for statement params.
fn to_sql(v: &SqlValue) -> rusqlite::types::Value {
    match v {
        SqlValue::Null => rusqlite::types::Value::Null,
        SqlValue::Integer(n) => rusqlite::types::Value::Integer(*n),
        SqlValue::Real(f) => rusqlite::types::Value::Real(*f),
        SqlValue::Text(s) => rusqlite::types::Value::Text(s.clone()),
    }
}

/// Map a rusqlite error to a `TaskSyncError`.
fn storage_err(e: rusqlite::Error) -> TaskSyncError {
    TaskSyncError::Store(StoreError::Sqlite(e))
}

// ============================================================================
// SqliteStore
// ============================================================================

/// SQLite store.
pub struct SqliteStore {
    conn: ReentrantMutex<RefCell<rusqlite::Connection>>,
    /// Sequence for savepoint names; every open transaction needs a name of
    /// its own.
    txn_seq: AtomicU64,
}

impl SqliteStore {
    /// Open a file-backed SQLite database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = rusqlite::Connection::open(path).map_err(storage_err)?;
        Ok(Self {
            conn: ReentrantMutex::new(RefCell::new(conn)),
            txn_seq: AtomicU64::new(0),
        })
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(storage_err)?;
        Ok(Self {
            conn: ReentrantMutex::new(RefCell::new(conn)),
            txn_seq: AtomicU64::new(0),
        })
    }

    /// Initialize pragmas and tables, and recover from an interrupted cycle.
    ///
    /// `in-progress` is an advisory marker set before transmit; a process
    /// crash never clears it, so any row still carrying it at startup is
    /// reset to `pending`.
    pub fn initialize(&self) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard.borrow();

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )
        .map_err(storage_err)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id              TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                description     TEXT NOT NULL DEFAULT '',
                completed       INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                is_deleted      INTEGER NOT NULL DEFAULT 0,
                sync_status     TEXT NOT NULL DEFAULT 'pending',
                server_id       TEXT,
                last_synced_at  TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_needs_sync
                ON tasks(sync_status, is_deleted);
            CREATE TABLE IF NOT EXISTS sync_queue (
                id             TEXT PRIMARY KEY,
                task_id        TEXT NOT NULL,
                operation      TEXT NOT NULL,
                data           TEXT NOT NULL,
                created_at     TEXT NOT NULL,
                retry_count    INTEGER NOT NULL DEFAULT 0,
                error_message  TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_sync_queue_task
                ON sync_queue(task_id, created_at);
            CREATE TABLE IF NOT EXISTS dead_letter_queue (
                id                   TEXT PRIMARY KEY,
                task_id              TEXT NOT NULL,
                operation            TEXT NOT NULL,
                data                 TEXT NOT NULL,
                created_at           TEXT NOT NULL,
                retry_count          INTEGER NOT NULL,
                failed_at            TEXT NOT NULL,
                final_error_message  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_dead_letter_failed_at
                ON dead_letter_queue(failed_at);",
        )
        .map_err(storage_err)?;

        let recovered = conn
            .execute(
                "UPDATE tasks SET sync_status = 'pending' WHERE sync_status = 'in-progress'",
                [],
            )
            .map_err(storage_err)?;
        if recovered > 0 {
            info!(recovered, "reset interrupted in-progress tasks to pending");
        }

        Ok(())
    }

    /// Run a parameterless statement, discarding the row count.
    fn exec(&self, sql: &str) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        conn.execute(sql, []).map(|_| ()).map_err(storage_err)
    }

    /// Parse a single rusqlite row into a `SqlRow`.
    fn row_to_cells(row: &rusqlite::Row<'_>) -> rusqlite::Result<SqlRow> {
        let count = row.as_ref().column_count();
        let mut cells = Vec::with_capacity(count);
        for idx in 0..count {
            let cell = match row.get_ref(idx)? {
                ValueRef::Null => SqlValue::Null,
                ValueRef::Integer(n) => SqlValue::Integer(n),
                ValueRef::Real(f) => SqlValue::Real(f),
                ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
                // The persisted schema stores no blobs.
                ValueRef::Blob(b) => SqlValue::Text(String::from_utf8_lossy(b).into_owned()),
            };
            cells.push(cell);
        }
        Ok(cells)
    }
}

// ============================================================================
// StoreAdapter implementation
// ============================================================================

impl StoreAdapter for SqliteStore {
    fn run(&self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        let mut stmt = conn.prepare_cached(sql).map_err(storage_err)?;
        stmt.execute(params_from_iter(params.iter().map(to_sql)))
            .map_err(storage_err)
    }

    fn get(&self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlRow>> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        let mut stmt = conn.prepare_cached(sql).map_err(storage_err)?;

        match stmt.query_row(
            params_from_iter(params.iter().map(to_sql)),
            Self::row_to_cells,
        ) {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    fn all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        let mut stmt = conn.prepare_cached(sql).map_err(storage_err)?;
        let rows = stmt
            .query_map(
                params_from_iter(params.iter().map(to_sql)),
                Self::row_to_cells,
            )
            .map_err(storage_err)?;
        let collected: rusqlite::Result<Vec<_>> = rows.collect();
        collected.map_err(storage_err)
    }

    fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        // Repositories open transactions from inside other transactions (a
        // dead-letter move inside a cycle, an intent append inside a row
        // write), so plain BEGIN/COMMIT would error. Savepoints nest; the
        // reentrant connection lock lets the closure keep issuing statements
        // through this same store while one is open.
        let name = format!("txn_{}", self.txn_seq.fetch_add(1, Ordering::Relaxed));
        self.exec(&format!("SAVEPOINT {name}"))?;

        let outcome = f(self);

        if outcome.is_ok() {
            if self.exec(&format!("RELEASE SAVEPOINT {name}")).is_err() {
                let _ = self.exec(&format!("ROLLBACK TO SAVEPOINT {name}"));
                let _ = self.exec(&format!("RELEASE SAVEPOINT {name}"));
                return Err(TaskSyncError::Store(StoreError::Transaction {
                    message: format!("could not release savepoint {name}"),
                    source: None,
                }));
            }
        } else {
            // ROLLBACK TO only rewinds the work; the savepoint itself stays
            // on the stack until released.
            let _ = self.exec(&format!("ROLLBACK TO SAVEPOINT {name}"));
            let _ = self.exec(&format!("RELEASE SAVEPOINT {name}"));
        }

        outcome
    }
}
