//! Core domain types: tasks, sync intents, and dead letters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generate a random UUID (v4) for task and queue-item identifiers.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// SyncStatus
// ============================================================================

/// Upload state of a task, as tracked on the task row itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// Has local changes that are not yet acknowledged by the server.
    Pending,
    /// Part of an in-flight batch. Advisory only; reset to `Pending` on
    /// startup since a crash mid-cycle never clears it.
    InProgress,
    /// Acknowledged by the server; no queue items remain for the task.
    Synced,
    /// A sync attempt failed but retries remain. Pending with history.
    Error,
    /// Retries exhausted; the intent lives in the dead-letter store.
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::InProgress => "in-progress",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(SyncStatus::Pending),
            "in-progress" => Some(SyncStatus::InProgress),
            "synced" => Some(SyncStatus::Synced),
            "error" => Some(SyncStatus::Error),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

// ============================================================================
// Operation
// ============================================================================

/// Kind of mutation a sync intent records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(Operation::Create),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            _ => None,
        }
    }
}

// ============================================================================
// Task
// ============================================================================

/// A user task. The JSON form of this struct is also the snapshot payload
/// carried by queue items and by conflict resolutions from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Client-generated identifier. Immutable.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete flag. Deleted rows stay visible to the sync engine but
    /// are hidden from normal reads.
    pub is_deleted: bool,
    pub sync_status: SyncStatus,
    /// Assigned by the server on first successful sync.
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Fields supplied when creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub completed: bool,
}

/// Partial update for a task. The id is immutable by construction: there is
/// no id field to patch.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

// ============================================================================
// Queue item / dead letter
// ============================================================================

/// A durable sync intent: one recorded mutation awaiting upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub task_id: String,
    pub operation: Operation,
    /// Full task snapshot at the moment the intent was recorded.
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// A quarantined intent whose retries are exhausted. Carries the original
/// intent verbatim plus the failure record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: String,
    pub task_id: String,
    pub operation: Operation,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub failed_at: DateTime<Utc>,
    pub final_error_message: String,
}

// ============================================================================
// Tests
// ============================================================================
