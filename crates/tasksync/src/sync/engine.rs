//! SyncEngine: drives one batched upload cycle.
//!
//! A cycle probes connectivity, drains the intent queue, groups intents by
//! task, packs bounded batches, transmits each batch, and settles every
//! per-item outcome. Failures are collected in `SyncResult.errors`;
//! `run_cycle` never returns `Err`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::Result;
use crate::storage::{DeadLetterStore, StoreAdapter, SyncQueue, TaskRepository};
use crate::types::{DeadLetter, QueueItem, SyncStatus, Task};

use super::conflict::{resolve, ConflictWinner};
use super::types::{
    BatchRequest, BatchResponse, ItemStatus, ProcessedItem, RemoteTransport, SyncErrorEvent,
    SyncIntent, SyncResult,
};

/// Reserved task id for the synthetic error recorded when the connectivity
/// probe fails.
const CONNECTION_TASK_ID: &str = "connection";
/// Reserved task id for synthetic errors caused by local store failures.
const SERVICE_TASK_ID: &str = "sync_service";

// ============================================================================
// SyncEngine
// ============================================================================

/// Configuration for `SyncEngine`.
pub struct SyncEngineOptions<S: StoreAdapter> {
    pub store: Arc<S>,
    pub transport: Arc<dyn RemoteTransport>,
    pub config: SyncConfig,
}

pub struct SyncEngine<S: StoreAdapter> {
    tasks: TaskRepository<S>,
    queue: SyncQueue<S>,
    dead_letters: DeadLetterStore<S>,
    store: Arc<S>,
    transport: Arc<dyn RemoteTransport>,
    config: SyncConfig,
    /// Serializes cycles. Overlapping `run_cycle` calls queue behind the
    /// running one instead of racing on the in-progress marker.
    cycle_lock: TokioMutex<()>,
}

impl<S: StoreAdapter> SyncEngine<S> {
    pub fn new(options: SyncEngineOptions<S>) -> Self {
        let mut config = options.config;
        // A zero batch size could never make packing progress.
        config.batch_size = config.batch_size.max(1);

        Self {
            tasks: TaskRepository::new(Arc::clone(&options.store)),
            queue: SyncQueue::new(Arc::clone(&options.store)),
            dead_letters: DeadLetterStore::new(Arc::clone(&options.store)),
            store: options.store,
            transport: options.transport,
            config,
            cycle_lock: TokioMutex::new(()),
        }
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Probe the server. True when the health endpoint answered 2xx within
    /// its deadline.
    pub async fn check_connectivity(&self) -> bool {
        self.transport.check_health().await.is_ok()
    }

    /// Run one sync cycle end to end.
    ///
    /// An unreachable server defers the whole cycle without touching any
    /// queue item. A local store failure is recorded as a synthetic
    /// `sync_service` error and ends the cycle.
    pub async fn run_cycle(&self) -> SyncResult {
        let _guard = self.cycle_lock.lock().await;

        let mut result = SyncResult::default();

        if !self.check_connectivity().await {
            debug!("server unreachable, deferring sync cycle");
            result.errors.push(SyncErrorEvent {
                task_id: CONNECTION_TASK_ID.to_string(),
                error: "server unreachable".to_string(),
            });
            result.success = false;
            return result;
        }

        if let Err(e) = self.run_cycle_inner(&mut result).await {
            result.errors.push(SyncErrorEvent {
                task_id: SERVICE_TASK_ID.to_string(),
                error: e.to_string(),
            });
        }

        result.success = result.errors.is_empty();
        result
    }

    // Status surface

    /// Number of intents awaiting upload.
    pub fn count_pending(&self) -> Result<usize> {
        self.queue.count_pending()
    }

    /// Instant of the most recent successful acknowledgement, if any.
    pub fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.tasks.last_synced_at()
    }

    /// Quarantined intents, newest failures first.
    pub fn dead_letter_contents(&self) -> Result<Vec<DeadLetter>> {
        self.dead_letters.all()
    }

    /// Reset dangling `in-progress` tasks to `pending`. Returns how many
    /// rows were reset.
    pub fn recover_interrupted(&self) -> Result<usize> {
        self.tasks.recover_interrupted()
    }

    // -----------------------------------------------------------------------
    // Cycle implementation
    // -----------------------------------------------------------------------

    async fn run_cycle_inner(&self, result: &mut SyncResult) -> Result<()> {
        let items = self.queue.drain_chronological()?;
        if items.is_empty() {
            debug!("sync queue empty, nothing to upload");
            return Ok(());
        }

        let groups = group_by_task(items);
        let batches = pack_batches(groups, self.config.batch_size);
        debug!(batches = batches.len(), "starting batch uploads");

        for batch in &batches {
            let mut marked: HashSet<&str> = HashSet::new();
            for item in batch {
                if marked.insert(item.task_id.as_str()) {
                    self.tasks
                        .set_sync_status(&item.task_id, SyncStatus::InProgress)?;
                }
            }

            let intents: Vec<SyncIntent> = batch.iter().map(SyncIntent::from).collect();
            let request = BatchRequest::new(intents, Utc::now());

            match self.transport.post_batch(&request).await {
                Ok(response) => {
                    if !response.checksum_verified {
                        // Integrity hint only; the per-item outcomes are
                        // still actionable.
                        warn!(
                            checksum = %request.checksum,
                            "server did not verify batch checksum"
                        );
                    }
                    self.settle_batch(batch, &response, result)?;
                }
                Err(e) => {
                    // One failed batch does not abort the cycle.
                    debug!(error = %e, "batch transport failure");
                    let message = format!("batch transport failure: {e}");
                    for item in batch {
                        self.handle_item_failure(item, &message, result)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Apply every per-item outcome of a transmitted batch.
    fn settle_batch(
        &self,
        batch: &[QueueItem],
        response: &BatchResponse,
        result: &mut SyncResult,
    ) -> Result<()> {
        let outcomes: HashMap<&str, &ProcessedItem> = response
            .processed_items
            .iter()
            .map(|p| (p.client_id.as_str(), p))
            .collect();

        for item in batch {
            let Some(outcome) = outcomes.get(item.id.as_str()) else {
                self.handle_item_failure(item, "server returned no outcome for item", result)?;
                continue;
            };

            match outcome.status {
                ItemStatus::Success => {
                    self.handle_item_success(item, outcome.server_id.as_deref())?;
                    result.synced_items += 1;
                }
                ItemStatus::Conflict => match &outcome.resolved_data {
                    Some(server_snapshot) => {
                        self.handle_item_conflict(
                            item,
                            server_snapshot,
                            outcome.server_id.as_deref(),
                        )?;
                        result.synced_items += 1;
                    }
                    None => {
                        self.handle_item_failure(
                            item,
                            "conflict outcome carried no server snapshot",
                            result,
                        )?;
                    }
                },
                ItemStatus::Error => {
                    let message = outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "server reported an unspecified error".to_string());
                    self.handle_item_failure(item, &message, result)?;
                }
            }
        }

        Ok(())
    }

    fn handle_item_success(&self, item: &QueueItem, server_id: Option<&str>) -> Result<()> {
        self.tasks.mark_synced(&item.task_id, server_id, Utc::now())?;
        self.queue.remove_for_task(&item.task_id)?;
        Ok(())
    }

    /// Resolve a conflict and settle the item as acknowledged.
    fn handle_item_conflict(
        &self,
        item: &QueueItem,
        server_snapshot: &Task,
        server_id: Option<&str>,
    ) -> Result<()> {
        let local = self.tasks.get_with_deleted(&item.task_id)?;
        let now = Utc::now();

        let winner = match &local {
            Some(local) => resolve(local, server_snapshot),
            // No local row left to defend; take the server's version.
            None => ConflictWinner::Server,
        };

        match winner {
            ConflictWinner::Local => {
                debug!(task_id = %item.task_id, "conflict resolved, local snapshot kept");
                self.tasks.mark_synced(&item.task_id, server_id, now)?;
            }
            ConflictWinner::Server => {
                debug!(task_id = %item.task_id, "conflict resolved, server snapshot applied");
                let mut resolved = server_snapshot.clone();
                // The row identity is local; the server snapshot may carry
                // only its own identifier.
                resolved.id = item.task_id.clone();
                resolved.sync_status = SyncStatus::Synced;
                resolved.last_synced_at = Some(now);
                if let Some(sid) = server_id {
                    resolved.server_id = Some(sid.to_string());
                }
                self.tasks.overwrite(&resolved)?;
            }
        }

        self.queue.remove(&item.id)?;
        Ok(())
    }

    /// Bounded-retry accounting for a failed item.
    fn handle_item_failure(
        &self,
        item: &QueueItem,
        message: &str,
        result: &mut SyncResult,
    ) -> Result<()> {
        let attempts = item.retry_count + 1;
        if attempts < self.config.max_retries {
            let still_queued = self.queue.bump_retry(&item.id, attempts, message)?;
            if still_queued {
                self.tasks.set_sync_status(&item.task_id, SyncStatus::Error)?;
            }
            // An item acknowledged earlier in this cycle may already be
            // gone from the queue; there is nothing left to retry then.
        } else {
            warn!(
                task_id = %item.task_id,
                attempts,
                "retries exhausted, quarantining intent"
            );
            self.store.transaction(|_| {
                self.dead_letters.insert(item, Utc::now(), message)?;
                self.queue.remove(&item.id)?;
                Ok(())
            })?;
            self.tasks
                .set_sync_status(&item.task_id, SyncStatus::Failed)?;
        }

        result.failed_items += 1;
        result.errors.push(SyncErrorEvent {
            task_id: item.task_id.clone(),
            error: message.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// Grouping and batching
// ============================================================================

/// Partition items by task, preserving per-group chronological order and the
/// first-seen order of tasks.
fn group_by_task(items: Vec<QueueItem>) -> Vec<Vec<QueueItem>> {
    let mut groups: Vec<Vec<QueueItem>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in items {
        match index.get(&item.task_id) {
            Some(&slot) => groups[slot].push(item),
            None => {
                index.insert(item.task_id.clone(), groups.len());
                groups.push(vec![item]);
            }
        }
    }

    groups
}

/// Pack groups into batches of at most `batch_size` items.
///
/// Groups are walked in order and may split across a batch boundary, but the
/// members of one group never reorder: items of the same task always reach
/// the server chronologically.
fn pack_batches(groups: Vec<Vec<QueueItem>>, batch_size: usize) -> Vec<Vec<QueueItem>> {
    let mut batches: Vec<Vec<QueueItem>> = Vec::new();
    let mut current: Vec<QueueItem> = Vec::new();

    for group in groups {
        for item in group {
            if current.len() == batch_size {
                batches.push(std::mem::take(&mut current));
            }
            current.push(item);
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

// ============================================================================
// Tests
// ============================================================================
