//! Conflict resolver tests through the public surface.

use chrono::{DateTime, Duration, Utc};
use tasksync::sync::{resolve, ConflictWinner};
use tasksync::types::{SyncStatus, Task};

fn snapshot(title: &str, updated_at: DateTime<Utc>) -> Task {
    Task {
        id: "t1".to_string(),
        title: title.to_string(),
        description: String::new(),
        completed: false,
        created_at: updated_at - Duration::hours(1),
        updated_at,
        is_deleted: false,
        sync_status: SyncStatus::Pending,
        server_id: None,
        last_synced_at: None,
    }
}

#[test]
fn strictly_newer_side_wins_either_way() {
    let older = Utc::now();
    let newer = older + Duration::seconds(1);

    let local = snapshot("local", newer);
    let server = snapshot("server", older);
    assert_eq!(resolve(&local, &server), ConflictWinner::Local);

    let local = snapshot("local", older);
    let server = snapshot("server", newer);
    assert_eq!(resolve(&local, &server), ConflictWinner::Server);
}

#[test]
fn equal_timestamps_always_yield_the_server_snapshot() {
    let now = Utc::now();
    let local = snapshot("local", now);
    let server = snapshot("server", now);

    for _ in 0..3 {
        assert_eq!(resolve(&local, &server), ConflictWinner::Server);
    }
}

#[test]
fn resolution_depends_only_on_updated_at() {
    let older = Utc::now();
    let newer = older + Duration::minutes(5);

    let mut local = snapshot("local", newer);
    local.is_deleted = true;
    local.sync_status = SyncStatus::Error;
    local.completed = true;

    let mut server = snapshot("server", older);
    server.server_id = Some("s1".to_string());
    server.last_synced_at = Some(older);

    // Deletion flags, statuses, and server fields do not sway the outcome.
    assert_eq!(resolve(&local, &server), ConflictWinner::Local);
}
