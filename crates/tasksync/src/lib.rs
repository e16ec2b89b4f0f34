//! Offline-first task synchronization engine.
//!
//! Records every local task mutation as a durable sync intent in the same
//! transaction as the row write, uploads intents in checksum-protected
//! batches with bounded retries and a dead-letter quarantine, and resolves
//! conflicts with a last-writer-wins rule (server wins ties).

pub mod config;
pub mod error;
pub mod types;

pub mod remote;
pub mod storage;
pub mod sync;

pub use config::SyncConfig;
pub use error::{Result, StoreError, TaskSyncError};
pub use remote::HttpRemoteClient;
#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
pub use storage::{DeadLetterStore, SqlRow, SqlValue, StoreAdapter, SyncQueue, TaskRepository};
pub use sync::{
    ConflictWinner, RemoteTransport, SyncEngine, SyncEngineOptions, SyncResult, TransportError,
};
pub use types::{DeadLetter, NewTask, Operation, QueueItem, SyncStatus, Task, TaskPatch};
