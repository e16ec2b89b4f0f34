//! SyncQueue tests: append, chronological drain, retry accounting.

use std::sync::Arc;

use serde_json::json;
use tasksync::storage::{SqliteStore, SyncQueue};
use tasksync::types::Operation;

fn setup() -> SyncQueue<SqliteStore> {
    let store = SqliteStore::open_in_memory().unwrap();
    store.initialize().unwrap();
    SyncQueue::new(Arc::new(store))
}

#[test]
fn enqueue_sets_initial_state() {
    let queue = setup();

    let item = queue
        .enqueue("task-a", Operation::Create, json!({"title": "x"}))
        .unwrap();

    assert!(!item.id.is_empty());
    assert_eq!(item.task_id, "task-a");
    assert_eq!(item.retry_count, 0);
    assert!(item.error_message.is_none());
    assert_eq!(queue.count_pending().unwrap(), 1);
}

#[test]
fn drain_orders_by_task_then_time() {
    let queue = setup();

    let a1 = queue.enqueue("task-a", Operation::Create, json!({})).unwrap();
    let b1 = queue.enqueue("task-b", Operation::Create, json!({})).unwrap();
    let a2 = queue.enqueue("task-a", Operation::Update, json!({})).unwrap();

    let drained = queue.drain_chronological().unwrap();
    let ids: Vec<&str> = drained.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, [a1.id.as_str(), a2.id.as_str(), b1.id.as_str()]);
}

#[test]
fn drained_items_round_trip_their_snapshot() {
    let queue = setup();

    let snapshot = json!({"title": "Write report", "completed": false, "tags": [1, 2]});
    let item = queue
        .enqueue("task-a", Operation::Update, snapshot.clone())
        .unwrap();

    let drained = queue.drain_chronological().unwrap();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0], item);
    assert_eq!(drained[0].data, snapshot);
}

#[test]
fn bump_retry_updates_count_and_error() {
    let queue = setup();

    let item = queue.enqueue("task-a", Operation::Create, json!({})).unwrap();
    assert!(queue.bump_retry(&item.id, 1, "connection reset").unwrap());

    let drained = queue.drain_chronological().unwrap();
    assert_eq!(drained[0].retry_count, 1);
    assert_eq!(drained[0].error_message.as_deref(), Some("connection reset"));
}

#[test]
fn bump_retry_reports_missing_items() {
    let queue = setup();
    assert!(!queue.bump_retry("ghost", 1, "nope").unwrap());
}

#[test]
fn remove_deletes_a_single_item() {
    let queue = setup();

    let keep = queue.enqueue("task-a", Operation::Create, json!({})).unwrap();
    let gone = queue.enqueue("task-a", Operation::Update, json!({})).unwrap();

    queue.remove(&gone.id).unwrap();

    let remaining = queue.drain_chronological().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, keep.id);
}

#[test]
fn remove_for_task_clears_only_that_task() {
    let queue = setup();

    queue.enqueue("task-a", Operation::Create, json!({})).unwrap();
    queue.enqueue("task-a", Operation::Update, json!({})).unwrap();
    let other = queue.enqueue("task-b", Operation::Create, json!({})).unwrap();

    assert_eq!(queue.remove_for_task("task-a").unwrap(), 2);

    let remaining = queue.drain_chronological().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, other.id);
}

#[test]
fn items_for_task_are_chronological() {
    let queue = setup();

    let first = queue.enqueue("task-a", Operation::Create, json!({})).unwrap();
    queue.enqueue("task-b", Operation::Create, json!({})).unwrap();
    let second = queue.enqueue("task-a", Operation::Delete, json!({})).unwrap();

    let items = queue.items_for_task("task-a").unwrap();
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, [first.id.as_str(), second.id.as_str()]);
}

#[test]
fn count_pending_tracks_queue_size() {
    let queue = setup();
    assert_eq!(queue.count_pending().unwrap(), 0);

    let item = queue.enqueue("task-a", Operation::Create, json!({})).unwrap();
    queue.enqueue("task-b", Operation::Create, json!({})).unwrap();
    assert_eq!(queue.count_pending().unwrap(), 2);

    queue.remove(&item.id).unwrap();
    assert_eq!(queue.count_pending().unwrap(), 1);
}
