pub mod dead_letter;
pub mod queue;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod tasks;
pub mod traits;

pub use dead_letter::DeadLetterStore;
pub use queue::SyncQueue;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use tasks::TaskRepository;
pub use traits::{SqlRow, SqlValue, StoreAdapter};

use chrono::{DateTime, SecondsFormat, Utc};

/// Current instant truncated to microsecond precision, the resolution the
/// text storage format keeps. Mutation timestamps must round-trip exactly
/// through their stored form.
pub(crate) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

/// Format an instant for text storage. The fixed six fractional digits keep
/// lexicographic text order identical to chronological order.
pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an instant from its stored text form.
pub(crate) fn ts_from_sql(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
