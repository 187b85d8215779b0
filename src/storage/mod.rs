pub mod aggregates;
pub mod engine;
pub mod filter;
pub mod pipeline;
pub mod snapshot;

pub use aggregates::{create_accumulator, Accumulator};
pub use engine::{doc_id, Datastore, MemoryStore, StorageError};
pub use pipeline::run_pipeline;
pub use snapshot::{Snapshot, SnapshotInfo};
