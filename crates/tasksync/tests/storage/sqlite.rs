//! SqliteStore adapter tests: statement execution and transaction semantics.

use tasksync::error::TaskSyncError;
use tasksync::storage::{SqlValue, SqliteStore, StoreAdapter};

fn setup() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store.initialize().unwrap();
    store
}

#[test]
fn run_get_all_round_trip() {
    let store = setup();
    store
        .run("CREATE TABLE scratch (k TEXT PRIMARY KEY, v INTEGER)", &[])
        .unwrap();

    store
        .run(
            "INSERT INTO scratch (k, v) VALUES (?1, ?2)",
            &[SqlValue::from("a"), SqlValue::from(1i64)],
        )
        .unwrap();
    store
        .run(
            "INSERT INTO scratch (k, v) VALUES (?1, ?2)",
            &[SqlValue::from("b"), SqlValue::from(2i64)],
        )
        .unwrap();

    let row = store
        .get(
            "SELECT k, v FROM scratch WHERE k = ?1",
            &[SqlValue::from("a")],
        )
        .unwrap()
        .unwrap();
    assert_eq!(row[0], SqlValue::Text("a".to_string()));
    assert_eq!(row[1], SqlValue::Integer(1));

    let rows = store
        .all("SELECT k FROM scratch ORDER BY k", &[])
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][0], SqlValue::Text("b".to_string()));
}

#[test]
fn get_returns_none_without_rows() {
    let store = setup();
    let row = store
        .get("SELECT id FROM tasks WHERE id = ?1", &[SqlValue::from("x")])
        .unwrap();
    assert!(row.is_none());
}

#[test]
fn run_reports_affected_rows() {
    let store = setup();
    store
        .run("CREATE TABLE scratch (k TEXT PRIMARY KEY)", &[])
        .unwrap();
    store
        .run("INSERT INTO scratch (k) VALUES ('a'), ('b')", &[])
        .unwrap();

    let affected = store.run("DELETE FROM scratch", &[]).unwrap();
    assert_eq!(affected, 2);

    let affected = store.run("DELETE FROM scratch", &[]).unwrap();
    assert_eq!(affected, 0);
}

#[test]
fn null_round_trips() {
    let store = setup();
    store
        .run("CREATE TABLE scratch (k TEXT, v TEXT)", &[])
        .unwrap();
    store
        .run(
            "INSERT INTO scratch (k, v) VALUES (?1, ?2)",
            &[SqlValue::from("a"), SqlValue::Null],
        )
        .unwrap();

    let row = store.get("SELECT v FROM scratch", &[]).unwrap().unwrap();
    assert!(row[0].is_null());
}

#[test]
fn transaction_commits_on_ok() {
    let store = setup();
    store
        .run("CREATE TABLE scratch (k TEXT PRIMARY KEY)", &[])
        .unwrap();

    store
        .transaction(|s| {
            s.run("INSERT INTO scratch (k) VALUES ('a')", &[])?;
            Ok(())
        })
        .unwrap();

    let rows = store.all("SELECT k FROM scratch", &[]).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn transaction_rolls_back_on_err() {
    let store = setup();
    store
        .run("CREATE TABLE scratch (k TEXT PRIMARY KEY)", &[])
        .unwrap();

    let result: Result<(), TaskSyncError> = store.transaction(|s| {
        s.run("INSERT INTO scratch (k) VALUES ('a')", &[])?;
        Err(TaskSyncError::EmptyTitle)
    });
    assert!(result.is_err());

    let rows = store.all("SELECT k FROM scratch", &[]).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn nested_transactions_compose() {
    let store = setup();
    store
        .run("CREATE TABLE scratch (k TEXT PRIMARY KEY)", &[])
        .unwrap();

    store
        .transaction(|s| {
            s.run("INSERT INTO scratch (k) VALUES ('outer')", &[])?;

            // Inner savepoint fails; only its write rolls back.
            let inner: Result<(), TaskSyncError> = s.transaction(|s| {
                s.run("INSERT INTO scratch (k) VALUES ('inner')", &[])?;
                Err(TaskSyncError::EmptyTitle)
            });
            assert!(inner.is_err());

            Ok(())
        })
        .unwrap();

    let rows = store.all("SELECT k FROM scratch", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], SqlValue::Text("outer".to_string()));
}

#[test]
fn initialize_is_idempotent() {
    let store = setup();
    store.initialize().unwrap();
    store.initialize().unwrap();
}

#[test]
fn initialize_resets_dangling_in_progress() {
    let store = setup();
    store
        .run(
            "INSERT INTO tasks (id, title, created_at, updated_at, sync_status) \
             VALUES ('t1', 'task', '2024-01-01T00:00:00.000000Z', \
                     '2024-01-01T00:00:00.000000Z', 'in-progress')",
            &[],
        )
        .unwrap();

    store.initialize().unwrap();

    let row = store
        .get("SELECT sync_status FROM tasks WHERE id = 't1'", &[])
        .unwrap()
        .unwrap();
    assert_eq!(row[0], SqlValue::Text("pending".to_string()));
}
