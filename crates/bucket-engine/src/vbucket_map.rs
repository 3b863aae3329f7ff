use bucket_bgfetcher::{BgFetchItem, PendingFetchSource};
use bucket_core::VBucketId;
use bucket_vbucket::VBucket;
use dashmap::DashMap;
use std::sync::Arc;

/// The bucket-wide table of live vBuckets, keyed by id. Implements
/// [`PendingFetchSource`] by delegating to each vBucket's own
/// [`bucket_vbucket::PendingFetchQueue`], which is what decouples
/// `bucket-bgfetcher` from `bucket-vbucket` in the first place (§4.3, §4.4).
#[derive(Default)]
pub struct VBucketMap {
    vbuckets: DashMap<VBucketId, Arc<VBucket>>,
}

impl VBucketMap {
    pub fn new() -> Self {
        VBucketMap::default()
    }

    pub fn insert(&self, vbucket: Arc<VBucket>) {
        self.vbuckets.insert(vbucket.id(), vbucket);
    }

    pub fn get(&self, id: VBucketId) -> Option<Arc<VBucket>> {
        self.vbuckets.get(&id).map(|e| e.value().clone())
    }

    pub fn remove(&self, id: VBucketId) -> Option<Arc<VBucket>> {
        self.vbuckets.remove(&id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.vbuckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vbuckets.is_empty()
    }

    pub fn iter(&self) -> Vec<Arc<VBucket>> {
        self.vbuckets.iter().map(|e| e.value().clone()).collect()
    }
}

impl PendingFetchSource for VBucketMap {
    /// A vBucket that hasn't been registered yet is treated as still being
    /// created, so the fetcher keeps requeuing it rather than silently
    /// dropping the fetch (§4.3 `run`, "If the vBucket's storage file is
    /// being created").
    fn vbucket_creation_pending(&self, vbucket: VBucketId) -> bool {
        match self.get(vbucket) {
            Some(vb) => vb.pending_fetches().is_creating(),
            None => true,
        }
    }

    fn drain_pending_fetches(&self, vbucket: VBucketId) -> Vec<BgFetchItem> {
        match self.get(vbucket) {
            Some(vb) => vb.pending_fetches().drain(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_bgfetcher::BgFetcher;
    use bucket_core::SystemClock;
    use bucket_executor::{ExecutorConfig, ExecutorPool};
    use bucket_storage::MemoryKvStore;
    use bucket_vbucket::LifecycleState;
    use std::time::Duration;

    fn test_pool() -> Arc<ExecutorPool> {
        ExecutorPool::new(
            ExecutorConfig { readers: 1, writers: 1, aux_io: 1, non_io: 1, global_thread_cap: None, idle_park: Duration::from_millis(10) },
            Arc::new(SystemClock),
        )
    }

    #[test]
    fn absent_vbucket_is_creation_pending() {
        let map = VBucketMap::new();
        assert!(map.vbucket_creation_pending(VBucketId(0)));
        assert!(map.drain_pending_fetches(VBucketId(0)).is_empty());
    }

    #[test]
    fn registered_vbucket_delegates_to_its_own_queue() {
        let map = VBucketMap::new();
        let pool = test_pool();
        let clock = Arc::new(SystemClock);
        let storage = Arc::new(MemoryKvStore::new());
        struct Noop;
        impl PendingFetchSource for Noop {
            fn vbucket_creation_pending(&self, _vbucket: VBucketId) -> bool {
                false
            }
            fn drain_pending_fetches(&self, _vbucket: VBucketId) -> Vec<BgFetchItem> {
                Vec::new()
            }
        }
        let fetcher = BgFetcher::new("shard-0", Default::default(), storage, Arc::new(Noop), pool.clone());
        let vb = VBucket::new(VBucketId(1), LifecycleState::Active, Default::default(), fetcher, clock);
        map.insert(vb.clone());

        assert!(!map.vbucket_creation_pending(VBucketId(1)));
        vb.pending_fetches().push(BgFetchItem::new(b"k".to_vec(), Box::new(|_| {})));
        assert_eq!(map.drain_pending_fetches(VBucketId(1)).len(), 1);
        pool.shutdown();
    }
}
