//! VBucket: hash index, checkpoint-manager binding, lifecycle state
//! machine, and rollback (§3, §4.4).

pub use bgfetch_queue::PendingFetchQueue;
pub use bloom::BloomFilter;
pub use failover::FailoverTable;
pub use hash_table::{HashTable, HashTableEntry, Residency};
pub use notify::NotificationList;
pub use state::LifecycleState;
pub use vbucket::{GetOutcome, VBucket, VBucketConfig};

mod bgfetch_queue;
mod bloom;
mod failover;
mod hash_table;
mod notify;
mod state;
mod vbucket;
