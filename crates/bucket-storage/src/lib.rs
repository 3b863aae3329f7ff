//! The Storage KV-Store façade consumed by the core (§6.1). Everything the
//! core needs from the persistent side is expressed as the [`KvStore`]
//! trait; the core never depends on a particular on-disk encoding (§1
//! Non-goals).

pub use filters::{DocumentFilter, ValueFilter};
pub use memory::MemoryKvStore;
pub use scan::{ScanContext, ScanOutcome};
pub use store::{
    DbFileInfo, GetResult, KvStore, MutationStatus, RollbackResult, SnapshotMode, VBucketState,
};

mod filters;
mod memory;
mod scan;
mod store;
