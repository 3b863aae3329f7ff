use crate::bgfetch_queue::PendingFetchQueue;
use crate::bloom::BloomFilter;
use crate::failover::FailoverTable;
use crate::hash_table::{HashTable, Residency};
use crate::notify::NotificationList;
use crate::state::LifecycleState;
use bucket_bgfetcher::{BgFetchItem, BgFetchWaiter, BgFetcher};
use bucket_checkpoint::{CheckpointManager, CheckpointManagerConfig, CursorTarget, SnapshotRange, PERSISTENCE_CURSOR};
use bucket_core::{Cas, Clock, Error, Item, ItemBuilder, SeqNo, VBucketId};
use bucket_storage::KvStore;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result of a `get` against the hash index (§4.4 "Get (hit)"/"Get (miss)").
pub enum GetOutcome {
    Hit(Item),
    WouldBlock,
}

pub struct VBucketConfig {
    pub checkpoint: CheckpointManagerConfig,
}

impl Default for VBucketConfig {
    fn default() -> Self {
        VBucketConfig { checkpoint: CheckpointManagerConfig::default() }
    }
}

/// A single logical shard (§3). Owns the hash index, the checkpoint
/// manager, the pending bg-fetch queue, and the failover/notification
/// side-state. The caller is expected to hold an external state-read lock
/// for the duration of an operation (§4.4 preamble) — here that role is
/// played by `state: RwLock<LifecycleState>` itself, taken in read mode by
/// every mutation/read and in write mode only by `transition_to`.
pub struct VBucket {
    id: VBucketId,
    state: RwLock<LifecycleState>,
    hash_table: HashTable,
    checkpoints: RwLock<CheckpointManager>,
    pending_fetches: PendingFetchQueue,
    failover_table: FailoverTable,
    notifications: NotificationList,
    bloom_filter: BloomFilter,
    purge_seqno: AtomicU64,
    max_cas: AtomicU64,
    persisted_snapshot: Mutex<SnapshotRange>,
    bgfetcher: Arc<BgFetcher>,
    clock: Arc<dyn Clock>,
}

impl VBucket {
    pub fn new(
        id: VBucketId,
        initial_state: LifecycleState,
        config: VBucketConfig,
        bgfetcher: Arc<BgFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let checkpoints = CheckpointManager::new(id, config.checkpoint, clock.clone());
        checkpoints
            .register_cursor(PERSISTENCE_CURSOR, CursorTarget::ByCheckpointId(bucket_checkpoint::CheckpointId(1)))
            .expect("a freshly constructed checkpoint manager always has checkpoint id 1");
        Arc::new(VBucket {
            id,
            state: RwLock::new(initial_state),
            hash_table: HashTable::new(),
            checkpoints: RwLock::new(checkpoints),
            pending_fetches: PendingFetchQueue::new(),
            failover_table: FailoverTable::new(),
            notifications: NotificationList::new(),
            bloom_filter: BloomFilter::new(),
            purge_seqno: AtomicU64::new(0),
            max_cas: AtomicU64::new(0),
            persisted_snapshot: Mutex::new(SnapshotRange { start: SeqNo::ZERO, end: SeqNo::ZERO }),
            bgfetcher,
            clock,
        })
    }

    pub fn id(&self) -> VBucketId {
        self.id
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub fn checkpoints(&self) -> &RwLock<CheckpointManager> {
        &self.checkpoints
    }

    pub fn hash_table(&self) -> &HashTable {
        &self.hash_table
    }

    pub fn failover_table(&self) -> &FailoverTable {
        &self.failover_table
    }

    pub fn bloom_filter(&self) -> &BloomFilter {
        &self.bloom_filter
    }

    pub fn high_seqno(&self) -> SeqNo {
        self.checkpoints.read().last_by_seqno()
    }

    pub fn purge_seqno(&self) -> SeqNo {
        SeqNo(self.purge_seqno.load(Ordering::Acquire))
    }

    pub fn max_cas(&self) -> Cas {
        Cas(self.max_cas.load(Ordering::Acquire))
    }

    fn bump_max_cas(&self, cas: Cas) {
        self.max_cas.fetch_max(cas.0, Ordering::AcqRel);
    }

    fn require_mutable(&self) -> Result<(), Error> {
        match *self.state.read() {
            LifecycleState::Active => Ok(()),
            LifecycleState::Replica => Ok(()),
            _ => Err(Error::NotMyVBucket),
        }
    }

    /// §4.4 "Set / Replace".
    pub fn set(&self, key: impl Into<Bytes>, value: impl Into<Bytes>, cas: Option<Cas>) -> Result<Item, Error> {
        self.require_mutable()?;
        let key = key.into();
        let next_cas = cas.unwrap_or_else(|| {
            let existing = self.hash_table.get(&key);
            Cas(existing.map(|i| i.cas().0).unwrap_or(0) + 1)
        });
        let item = ItemBuilder::new(self.id, key).value(value).cas(next_cas).build();
        self.hash_table.upsert(item.clone());
        self.bump_max_cas(next_cas);
        let (queued, _classification) = self.checkpoints.read().queue_dirty(item, true);
        Ok(queued)
    }

    /// §4.4 "Delete": value dropped from the hash entry immediately, key
    /// retained as a tombstone until the persistence cursor passes it.
    pub fn delete(&self, key: impl Into<Bytes>, cas: Option<Cas>) -> Result<Item, Error> {
        self.require_mutable()?;
        let key = key.into();
        let existing = self.hash_table.get(&key);
        let next_cas = cas.unwrap_or_else(|| Cas(existing.as_ref().map(|i| i.cas().0).unwrap_or(0) + 1));
        let item = ItemBuilder::new(self.id, key).cas(next_cas).delete().build();
        self.hash_table.upsert(item.clone());
        self.bump_max_cas(next_cas);
        let (queued, _classification) = self.checkpoints.read().queue_dirty(item, true);
        Ok(queued)
    }

    /// §4.4 "Get (hit)"/"Get (miss)". On a miss, `waiter` is enqueued
    /// against the vBucket's pending bg-fetch queue and the shard's
    /// fetcher is woken; the caller must treat `Ok(GetOutcome::WouldBlock)`
    /// as `Error::WouldBlock` at the request boundary.
    pub fn get(&self, key: &[u8], waiter: BgFetchWaiter) -> Result<GetOutcome, Error> {
        if *self.state.read() == LifecycleState::Dead {
            return Err(Error::NotMyVBucket);
        }
        if let Some(Residency::Resident) = self.hash_table.residency_of(key) {
            return Ok(GetOutcome::Hit(self.hash_table.get(key).expect("residency just confirmed present")));
        }
        self.hash_table.insert_temp_initial(key, self.id);
        self.pending_fetches.push(BgFetchItem::new(key.to_vec(), waiter));
        self.bgfetcher.notify_bg_event(self.id);
        Ok(GetOutcome::WouldBlock)
    }

    pub fn pending_fetches(&self) -> &PendingFetchQueue {
        &self.pending_fetches
    }

    /// Records a completed flush batch and unblocks any high-priority
    /// waiters it satisfies (§4.4 "State transition", §3 "High-priority
    /// notification list").
    pub fn record_persisted_snapshot(&self, range: SnapshotRange) {
        *self.persisted_snapshot.lock() = range;
        self.notifications.notify_persisted_up_to(range.end);
    }

    pub fn persisted_snapshot(&self) -> SnapshotRange {
        *self.persisted_snapshot.lock()
    }

    /// Registers a waiter for `notifyOnPersistence` past `target_seqno`
    /// (§3 "High-priority notification list").
    pub fn notify_on_persistence(&self, target_seqno: SeqNo, callback: Box<dyn FnOnce(Result<(), Error>) + Send>) {
        if self.persisted_snapshot.lock().end >= target_seqno {
            callback(Ok(()));
            return;
        }
        self.notifications.register(target_seqno, callback);
    }

    /// §4.4 "State transition". `Active -> Dead` and `Replica -> Dead` are
    /// permitted; `Dead -> *` is not.
    pub fn transition_to(&self, next: LifecycleState) -> Result<(), Error> {
        let previous = {
            let mut state = self.state.write();
            if !state.can_transition_to(next) {
                return Err(Error::Invalid(format!("illegal vbucket transition {:?} -> {:?}", *state, next)));
            }
            let previous = *state;
            *state = next;
            previous
        };

        match next {
            LifecycleState::Active => {
                let persisted = self.persisted_snapshot.lock().end;
                self.notifications.notify_persisted_up_to(persisted);
            }
            LifecycleState::Dead => {
                self.notifications.fail_all(Error::NotMyVBucket);
                self.drop_all_cursors();
            }
            _ => {}
        }

        tracing::debug!(vbucket = %self.id, ?previous, ?next, "vbucket state transition");
        Ok(())
    }

    fn drop_all_cursors(&self) {
        let checkpoints = self.checkpoints.read();
        let _ = checkpoints.remove_cursor(PERSISTENCE_CURSOR);
        for name in checkpoints.list_cursors_to_drop() {
            let _ = checkpoints.remove_cursor(&name);
        }
    }

    /// §4.4 "Rollback(targetSeqno)". Delegates the header-rewind mechanics
    /// to the storage layer (out of scope here, §1) and reconciles the
    /// in-memory hash index and checkpoint log with the result.
    pub fn rollback(&self, storage: &dyn KvStore, target_seqno: SeqNo) -> Result<SeqNo, Error> {
        let current_high = self.high_seqno();
        let result = storage.rollback(self.id, target_seqno)?;

        let distance = current_high.0.saturating_sub(result.rolled_back_seqno.0);
        if current_high.0 > 0 && distance * 2 > current_high.0 {
            return Err(Error::RollbackRequired);
        }

        for key in &result.removed_keys {
            self.hash_table.remove(key);
        }
        for item in result.restored_items {
            self.hash_table.upsert(item);
        }

        let mut checkpoints = self.checkpoints.write();
        *checkpoints = CheckpointManager::new(self.id, CheckpointManagerConfig::default(), self.clock.clone());
        checkpoints
            .register_cursor(PERSISTENCE_CURSOR, CursorTarget::ByCheckpointId(bucket_checkpoint::CheckpointId(1)))
            .expect("freshly constructed checkpoint manager always has checkpoint id 1");
        drop(checkpoints);

        *self.persisted_snapshot.lock() = SnapshotRange { start: result.rolled_back_seqno, end: result.rolled_back_seqno };
        Ok(result.rolled_back_seqno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_bgfetcher::PendingFetchSource;
    use bucket_core::SystemClock;
    use bucket_executor::{ExecutorConfig, ExecutorPool};
    use bucket_storage::MemoryKvStore;
    use std::sync::mpsc;
    use std::time::Duration;

    struct NoopSource;

    impl PendingFetchSource for NoopSource {
        fn vbucket_creation_pending(&self, _vbucket: VBucketId) -> bool {
            false
        }

        fn drain_pending_fetches(&self, _vbucket: VBucketId) -> Vec<BgFetchItem> {
            Vec::new()
        }
    }

    fn test_vbucket(id: VBucketId) -> (Arc<VBucket>, Arc<ExecutorPool>, Arc<MemoryKvStore>) {
        let clock = Arc::new(SystemClock);
        let pool = ExecutorPool::new(
            ExecutorConfig {
                readers: 1,
                writers: 1,
                aux_io: 1,
                non_io: 1,
                global_thread_cap: None,
                idle_park: Duration::from_millis(10),
            },
            clock.clone(),
        );
        let storage = Arc::new(MemoryKvStore::new());
        let fetcher = BgFetcher::new("shard-0", Default::default(), storage.clone(), Arc::new(NoopSource), pool.clone());
        fetcher.start(None);
        let vbucket = VBucket::new(id, LifecycleState::Active, VBucketConfig::default(), fetcher, clock);
        (vbucket, pool, storage)
    }

    #[test]
    fn set_then_get_hits_resident_value() {
        let (vb, pool, _storage) = test_vbucket(VBucketId(0));
        vb.set("k", "v", None).unwrap();
        match vb.get(b"k", Box::new(|_| panic!("should not bg-fetch a resident key"))).unwrap() {
            GetOutcome::Hit(item) => assert_eq!(item.value().unwrap().as_ref(), b"v"),
            GetOutcome::WouldBlock => panic!("expected a hit"),
        }
        pool.shutdown();
    }

    #[test]
    fn get_miss_enqueues_bgfetch_waiter() {
        let (vb, pool, storage) = test_vbucket(VBucketId(1));
        storage.seed(ItemBuilder::new(VBucketId(1), "k").value("from-disk").build());

        let (tx, rx) = mpsc::channel();
        match vb.get(b"k", Box::new(move |result| { let _ = tx.send(result); })).unwrap() {
            GetOutcome::WouldBlock => {}
            GetOutcome::Hit(_) => panic!("expected a miss on an empty hash table"),
        }
        // The vbucket's own bg-fetcher never drains this vbucket's pending
        // queue (that plumbing belongs to bucket-engine's VBucketMap), so
        // the waiter is left registered rather than delivered here.
        assert!(!vb.pending_fetches().is_empty());
        drop(rx);
        pool.shutdown();
    }

    #[test]
    fn delete_tombstones_and_clears_value() {
        let (vb, pool, _storage) = test_vbucket(VBucketId(2));
        vb.set("k", "v", None).unwrap();
        let tombstone = vb.delete("k", None).unwrap();
        assert!(tombstone.is_deleted());
        assert!(vb.hash_table().get(b"k").unwrap().is_deleted());
        pool.shutdown();
    }

    #[test]
    fn dead_vbucket_rejects_mutation_and_fails_waiters() {
        let (vb, pool, _storage) = test_vbucket(VBucketId(3));
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired2 = fired.clone();
        vb.notify_on_persistence(SeqNo(100), Box::new(move |result| {
            assert!(result.is_err());
            fired2.store(true, Ordering::SeqCst);
        }));

        vb.transition_to(LifecycleState::Dead).unwrap();
        assert!(fired.load(Ordering::SeqCst));
        assert!(matches!(vb.set("k", "v", None), Err(Error::NotMyVBucket)));
        assert!(matches!(vb.transition_to(LifecycleState::Active), Err(Error::Invalid(_))));
        pool.shutdown();
    }

    #[test]
    fn active_transition_flushes_ready_notifications() {
        let (vb, pool, _storage) = test_vbucket(VBucketId(4));
        vb.record_persisted_snapshot(SnapshotRange { start: SeqNo(0), end: SeqNo(5) });

        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired2 = fired.clone();
        vb.notify_on_persistence(SeqNo(3), Box::new(move |result| {
            assert!(result.is_ok());
            fired2.store(true, Ordering::SeqCst);
        }));
        // Already satisfied by the recorded snapshot, so it should fire
        // immediately on registration rather than waiting for a transition.
        assert!(fired.load(Ordering::SeqCst));

        vb.transition_to(LifecycleState::Replica).unwrap();
        vb.transition_to(LifecycleState::Active).unwrap();
        pool.shutdown();
    }

    #[test]
    fn rollback_reconciles_hash_table_and_resets_checkpoints() {
        let (vb, pool, storage) = test_vbucket(VBucketId(5));
        vb.set("a", "1", None).unwrap();
        vb.set("b", "2", None).unwrap();
        storage.seed(ItemBuilder::new(VBucketId(5), "a").value("1").by_seqno(SeqNo(1)).build());

        let rolled_back = vb.rollback(storage.as_ref(), SeqNo(1)).unwrap();
        assert_eq!(rolled_back, SeqNo(1));
        assert_eq!(vb.high_seqno(), SeqNo::ZERO);
        pool.shutdown();
    }
}
