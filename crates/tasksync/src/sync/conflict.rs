//! Last-writer-wins conflict resolution.

use crate::types::Task;

/// Which snapshot a conflict resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictWinner {
    Local,
    Server,
}

/// Resolve a create/update/delete conflict at whole-entity granularity.
///
/// Pure over the two `updated_at` instants: the local snapshot wins iff it is
/// strictly newer; the server wins otherwise, including the equal-timestamp
/// tie.
pub fn resolve(local: &Task, server: &Task) -> ConflictWinner {
    if local.updated_at > server.updated_at {
        ConflictWinner::Local
    } else {
        ConflictWinner::Server
    }
}
