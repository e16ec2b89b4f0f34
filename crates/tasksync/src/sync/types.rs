//! Sync-specific types: transport trait, wire payloads, and cycle results.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Operation, QueueItem, Task};

// ============================================================================
// RemoteTransport
// ============================================================================

/// Network layer for the batch upload protocol.
///
/// Implementations transport one batch request to the server and return its
/// structured response, or a transport error. Semantic per-item errors travel
/// inside `BatchResponse::processed_items`.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Submit one batch. The implementation owns the 30-second deadline; a
    /// timeout is a transport failure of the whole batch.
    async fn post_batch(&self, batch: &BatchRequest) -> Result<BatchResponse, TransportError>;

    /// Connectivity probe. Any 2xx response counts as reachable.
    async fn check_health(&self) -> Result<(), TransportError>;
}

/// Transport-level error (wraps arbitrary error strings from the transport layer).
#[derive(Debug, Clone)]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}

// ============================================================================
// Wire types
// ============================================================================

/// One queue item as submitted to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncIntent {
    pub id: String,
    pub task_id: String,
    pub operation: Operation,
    /// Full task snapshot at the moment the intent was recorded.
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl From<&QueueItem> for SyncIntent {
    fn from(item: &QueueItem) -> Self {
        Self {
            id: item.id.clone(),
            task_id: item.task_id.clone(),
            operation: item.operation,
            data: item.data.clone(),
            created_at: item.created_at,
            retry_count: item.retry_count,
        }
    }
}

/// `POST /sync/batch` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<SyncIntent>,
    pub client_timestamp: DateTime<Utc>,
    /// Transport-integrity hint over the items, not a security primitive.
    pub checksum: String,
}

impl BatchRequest {
    pub fn new(items: Vec<SyncIntent>, client_timestamp: DateTime<Utc>) -> Self {
        let checksum = batch_checksum(&items);
        Self {
            items,
            client_timestamp,
            checksum,
        }
    }
}

/// Hex MD5 over `"<id>-<operation>-<task_id>"` for each item in submission
/// order, joined with `|`.
pub fn batch_checksum(items: &[SyncIntent]) -> String {
    let joined = items
        .iter()
        .map(|item| format!("{}-{}-{}", item.id, item.operation.as_str(), item.task_id))
        .collect::<Vec<_>>()
        .join("|");
    format!("{:x}", md5::compute(joined))
}

/// Per-item outcome reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Conflict,
    Error,
}

/// One entry of `BatchResponse::processed_items`, matched to its submitted
/// intent by `client_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedItem {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    pub status: ItemStatus,
    /// Server-side snapshot; present iff `status` is `conflict`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_data: Option<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /sync/batch` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub processed_items: Vec<ProcessedItem>,
    pub server_timestamp: DateTime<Utc>,
    pub checksum_verified: bool,
}

// ============================================================================
// Cycle result
// ============================================================================

/// Aggregated result of one sync cycle. Collected, never thrown: the engine
/// reports failures here instead of returning `Err`.
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    /// True iff `errors` is empty.
    pub success: bool,
    pub synced_items: usize,
    pub failed_items: usize,
    pub errors: Vec<SyncErrorEvent>,
}

/// One failure observed during a cycle. Synthetic records use reserved
/// task ids (`"connection"`, `"sync_service"`).
#[derive(Debug, Clone)]
pub struct SyncErrorEvent {
    pub task_id: String,
    pub error: String,
}

// ============================================================================
// Tests
// ============================================================================
