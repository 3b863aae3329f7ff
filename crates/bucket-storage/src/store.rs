use crate::filters::{DocumentFilter, ValueFilter};
use crate::scan::ScanContext;
use bucket_core::{Cas, Error, Item, SeqNo, VBucketId};
use std::collections::HashMap;

/// Result of a single-key `get` (§6.1). `partial` is set when only metadata
/// (no value) was loaded — the value-only eviction path asks for metadata
/// first and fetches the value lazily.
#[derive(Clone, Debug)]
pub struct GetResult {
    pub item: Option<Item>,
    pub status: Result<(), Error>,
    pub partial: bool,
}

impl GetResult {
    pub fn not_found() -> Self {
        GetResult { item: None, status: Err(Error::KeyMissing), partial: false }
    }

    pub fn found(item: Item) -> Self {
        GetResult { item: Some(item), status: Ok(()), partial: false }
    }
}

/// Outcome of `set`/`del` (§6.1). Batched through a transaction by the
/// implementation; the core only observes the final status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationStatus {
    Success,
    Invalid,
    Failed,
}

/// Whether a vBucket snapshot commits immediately (§6.1 `snapshotVBucket`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotMode {
    WithoutCommit,
    WithCommit,
}

/// The persistent side-channel vBucket state record (§6.2): a JSON document
/// the storage layer keeps under `_local/vbstate` per vBucket. `failover_table`
/// is kept opaque (a JSON array the core stores and hands back, per §3).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VBucketState {
    pub vbucket: VBucketId,
    pub state: String,
    pub checkpoint_id: u64,
    pub max_deleted_seqno: SeqNo,
    pub snap_start: SeqNo,
    pub snap_end: SeqNo,
    pub max_cas: Cas,
    pub drift_counter: i64,
    pub failover_table: serde_json::Value,
}

impl VBucketState {
    /// Fallback defaults derived from a file header's `last_sequence`, used
    /// when the `_local/vbstate` document is missing or partial (§6.2).
    pub fn from_last_sequence(vbucket: VBucketId, last_sequence: SeqNo) -> Self {
        VBucketState {
            vbucket,
            state: "dead".to_string(),
            checkpoint_id: 1,
            max_deleted_seqno: SeqNo::ZERO,
            snap_start: last_sequence,
            snap_end: last_sequence,
            max_cas: Cas::NONE,
            drift_counter: 0,
            failover_table: serde_json::Value::Array(Vec::new()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DbFileInfo {
    pub file_size: u64,
    pub space_used: u64,
}

/// Result of the storage-level half of a rollback (§4.4 "Rollback",
/// §6.1 `rollback`).
#[derive(Clone, Debug)]
pub struct RollbackResult {
    pub rolled_back_seqno: SeqNo,
    /// Keys that must be removed from the hash index because no older
    /// version survived the rewind.
    pub removed_keys: Vec<Vec<u8>>,
    /// Items reloaded from the rewound header, replacing the in-memory copy.
    pub restored_items: Vec<Item>,
}

/// A handle returned by [`KvStore::open`]; opaque to the core.
pub trait StorageHandle: Send + Sync {}

/// The persistent read/write façade the core consumes (§6.1). The core
/// never depends on a particular on-disk encoding — `bucket-storage`'s
/// in-memory [`crate::MemoryKvStore`] is the only implementation shipped
/// here; real B-tree/log-structured implementations are external
/// collaborators (§1).
pub trait KvStore: Send + Sync {
    fn get(&self, vbucket: VBucketId, key: &[u8], fetch_meta_only: bool) -> GetResult;

    /// Fills `waiters` in place; one call batches an entire bg-fetch round
    /// (§4.3). The key order of the output matches the input map's.
    fn get_multi(&self, vbucket: VBucketId, keys: &mut HashMap<Vec<u8>, GetResult>);

    fn set(&self, item: &Item) -> MutationStatus;

    fn del(&self, item: &Item) -> MutationStatus;

    fn commit(&self) -> Result<(), Error>;

    fn del_vbucket(&self, vbucket: VBucketId) -> Result<(), Error>;

    fn snapshot_vbucket(&self, vbucket: VBucketId, state: VBucketState, mode: SnapshotMode) -> Result<(), Error>;

    fn get_persisted_stats(&self) -> HashMap<String, String>;

    fn list_persisted_vbuckets(&self) -> Vec<VBucketState>;

    fn init_scan_context(
        &self,
        vbucket: VBucketId,
        start_seqno: SeqNo,
        documents: DocumentFilter,
        values: ValueFilter,
    ) -> ScanContext;

    fn scan(&self, ctx: &mut ScanContext) -> crate::ScanOutcome;

    fn rollback(&self, vbucket: VBucketId, target_seqno: SeqNo) -> Result<RollbackResult, Error>;

    fn get_all_keys(&self, vbucket: VBucketId, start_key: &[u8], count: usize) -> Vec<Vec<u8>>;

    fn get_num_items(&self, vbucket: VBucketId, range: Option<(SeqNo, SeqNo)>) -> u64;

    fn get_db_file_info(&self, vbucket: VBucketId) -> DbFileInfo;
}
