pub mod conflict;
pub mod engine;
pub mod types;

pub use conflict::{resolve, ConflictWinner};
pub use engine::{SyncEngine, SyncEngineOptions};
pub use types::{
    batch_checksum, BatchRequest, BatchResponse, ItemStatus, ProcessedItem, RemoteTransport,
    SyncErrorEvent, SyncIntent, SyncResult, TransportError,
};
