use crate::filters::{DocumentFilter, ValueFilter};
use crate::scan::{ScanContext, ScanOutcome};
use crate::store::{DbFileInfo, GetResult, KvStore, MutationStatus, RollbackResult, SnapshotMode, VBucketState};
use bucket_core::{Error, Item, SeqNo, VBucketId};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct Shard {
    items: HashMap<Vec<u8>, Item>,
    state: Option<VBucketState>,
}

/// A reference [`KvStore`] implementation backing tests and
/// `bucket-testing`. Not a production persistence engine — on-disk formats
/// are explicitly out of scope (§1) — but a faithful, fully working
/// implementation of the interface so the rest of the core can be exercised
/// without a real storage backend.
#[derive(Default)]
pub struct MemoryKvStore {
    shards: Mutex<HashMap<VBucketId, Shard>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        MemoryKvStore::default()
    }

    /// Seeds the store with an item, as if it had already been flushed.
    /// Test-only convenience; production paths always go through `set`.
    pub fn seed(&self, item: Item) {
        let mut shards = self.shards.lock();
        let shard = shards.entry(item.vbucket()).or_default();
        shard.items.insert(item.key().to_vec(), item);
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, vbucket: VBucketId, key: &[u8], fetch_meta_only: bool) -> GetResult {
        let shards = self.shards.lock();
        let Some(shard) = shards.get(&vbucket) else {
            return GetResult::not_found();
        };
        match shard.items.get(key) {
            Some(item) => {
                let mut result = GetResult::found(item.clone());
                result.partial = fetch_meta_only;
                result
            }
            None => GetResult::not_found(),
        }
    }

    fn get_multi(&self, vbucket: VBucketId, keys: &mut HashMap<Vec<u8>, GetResult>) {
        let shards = self.shards.lock();
        let shard = shards.get(&vbucket);
        for (key, result) in keys.iter_mut() {
            *result = match shard.and_then(|s| s.items.get(key)) {
                Some(item) => GetResult::found(item.clone()),
                None => GetResult::not_found(),
            };
        }
    }

    fn set(&self, item: &Item) -> MutationStatus {
        let mut shards = self.shards.lock();
        let shard = shards.entry(item.vbucket()).or_default();
        shard.items.insert(item.key().to_vec(), item.clone());
        MutationStatus::Success
    }

    fn del(&self, item: &Item) -> MutationStatus {
        let mut shards = self.shards.lock();
        let shard = shards.entry(item.vbucket()).or_default();
        shard.items.insert(item.key().to_vec(), item.clone());
        MutationStatus::Success
    }

    fn commit(&self) -> Result<(), Error> {
        Ok(())
    }

    fn del_vbucket(&self, vbucket: VBucketId) -> Result<(), Error> {
        self.shards.lock().remove(&vbucket);
        Ok(())
    }

    fn snapshot_vbucket(&self, vbucket: VBucketId, state: VBucketState, _mode: SnapshotMode) -> Result<(), Error> {
        let mut shards = self.shards.lock();
        let shard = shards.entry(vbucket).or_default();
        shard.state = Some(state);
        Ok(())
    }

    fn get_persisted_stats(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    fn list_persisted_vbuckets(&self) -> Vec<VBucketState> {
        self.shards.lock().values().filter_map(|s| s.state.clone()).collect()
    }

    fn init_scan_context(
        &self,
        vbucket: VBucketId,
        start_seqno: SeqNo,
        documents: DocumentFilter,
        values: ValueFilter,
    ) -> ScanContext {
        ScanContext::new(vbucket, start_seqno, documents, values)
    }

    fn scan(&self, ctx: &mut ScanContext) -> ScanOutcome {
        let shards = self.shards.lock();
        let Some(shard) = shards.get(&ctx.vbucket) else {
            return ScanOutcome::Success;
        };
        let mut items: Vec<&Item> = shard
            .items
            .values()
            .filter(|i| i.by_seqno() >= ctx.start_seqno)
            .filter(|i| ctx.documents != DocumentFilter::NoDeletes || !i.is_deleted())
            .collect();
        items.sort_by_key(|i| i.by_seqno());
        if ctx.cursor >= items.len() {
            ctx.cursor = 0;
            return ScanOutcome::Success;
        }
        ctx.cursor += 1;
        ScanOutcome::Again
    }

    fn rollback(&self, vbucket: VBucketId, target_seqno: SeqNo) -> Result<RollbackResult, Error> {
        let shards = self.shards.lock();
        let shard = shards.get(&vbucket).ok_or(Error::KeyMissing)?;
        let restored_items: Vec<Item> =
            shard.items.values().filter(|i| i.by_seqno() <= target_seqno).cloned().collect();
        let removed_keys: Vec<Vec<u8>> = shard
            .items
            .values()
            .filter(|i| i.by_seqno() > target_seqno)
            .map(|i| i.key().to_vec())
            .collect();
        Ok(RollbackResult { rolled_back_seqno: target_seqno, removed_keys, restored_items })
    }

    fn get_all_keys(&self, vbucket: VBucketId, start_key: &[u8], count: usize) -> Vec<Vec<u8>> {
        let shards = self.shards.lock();
        let Some(shard) = shards.get(&vbucket) else {
            return Vec::new();
        };
        let mut keys: Vec<Vec<u8>> =
            shard.items.keys().filter(|k| k.as_slice() >= start_key).cloned().collect();
        keys.sort();
        keys.truncate(count);
        keys
    }

    fn get_num_items(&self, vbucket: VBucketId, range: Option<(SeqNo, SeqNo)>) -> u64 {
        let shards = self.shards.lock();
        let Some(shard) = shards.get(&vbucket) else {
            return 0;
        };
        match range {
            None => shard.items.len() as u64,
            Some((min, max)) => {
                shard.items.values().filter(|i| i.by_seqno() >= min && i.by_seqno() <= max).count() as u64
            }
        }
    }

    fn get_db_file_info(&self, vbucket: VBucketId) -> DbFileInfo {
        let shards = self.shards.lock();
        let size = shards.get(&vbucket).map(|s| s.items.len()).unwrap_or(0) as u64 * 128;
        DbFileInfo { file_size: size, space_used: size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_core::ItemBuilder;

    #[test]
    fn set_then_get_roundtrips() {
        let store = MemoryKvStore::new();
        let vb = VBucketId(0);
        let item = ItemBuilder::new(vb, "k").value("v").build();
        store.set(&item);
        let result = store.get(vb, b"k", false);
        assert_eq!(result.item.unwrap().value().unwrap().as_ref(), b"v");
    }

    #[test]
    fn get_multi_fills_in_place() {
        let store = MemoryKvStore::new();
        let vb = VBucketId(0);
        store.set(&ItemBuilder::new(vb, "a").value("1").build());
        let mut keys = HashMap::new();
        keys.insert(b"a".to_vec(), GetResult::not_found());
        keys.insert(b"missing".to_vec(), GetResult::not_found());
        store.get_multi(vb, &mut keys);
        assert!(keys[&b"a".to_vec()].status.is_ok());
        assert!(keys[&b"missing".to_vec()].status.is_err());
    }

    #[test]
    fn snapshot_then_list_contains_written_state() {
        let store = MemoryKvStore::new();
        let vb = VBucketId(3);
        let state = VBucketState::from_last_sequence(vb, SeqNo(10));
        store.snapshot_vbucket(vb, state.clone(), SnapshotMode::WithCommit).unwrap();
        let listed = store.list_persisted_vbuckets();
        assert!(listed.contains(&state));
    }
}
