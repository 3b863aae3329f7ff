//! The Checkpoint Manager (§4.2): a per-vBucket ordered mutation log with
//! efficient per-key deduplication and cursor-based consumption.

pub use checkpoint::{Checkpoint, CheckpointId, CheckpointState};
pub use classification::QueueClassification;
pub use cursor::{CursorError, CursorPosition};
pub use manager::{CheckpointManager, CheckpointManagerConfig, CursorTarget, PERSISTENCE_CURSOR};
pub use snapshot::SnapshotRange;

mod checkpoint;
mod classification;
mod cursor;
mod manager;
mod snapshot;
