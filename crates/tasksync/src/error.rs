use thiserror::Error;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Row corruption in {table}/{id}: failed to read \"{column}\"")]
    Corruption {
        table: String,
        id: String,
        column: String,
    },

    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

// ---------------------------------------------------------------------------
// TaskSyncError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TaskSyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Task title must not be empty")]
    EmptyTitle,

    #[error("Snapshot encoding failed: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Convenience alias; the default error type is `TaskSyncError`.
pub type Result<T, E = TaskSyncError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
