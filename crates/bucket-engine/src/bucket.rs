use crate::checkpoint_remover::CheckpointRemoverTask;
use crate::config::BucketConfig;
use crate::notify::{MemoryStats, NullReplicationHub, ReplicationHub};
use crate::vbucket_map::VBucketMap;
use crate::warmup_sink::EngineWarmupSink;
use bucket_bgfetcher::{BgFetchWaiter, BgFetcher, BgFetcherConfig};
use bucket_core::{Cas, Clock, Error, Item, SystemClock, VBucketId};
use bucket_executor::{BucketHandle, ExecutorConfig, ExecutorPool, Task};
use bucket_storage::KvStore;
use bucket_vbucket::{GetOutcome, LifecycleState, VBucket, VBucketConfig};
use bucket_warmup::Warmup;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A no-op watermark pair used when the host process doesn't wire up real
/// memory accounting — the cursor dropper and warmup's traffic gate simply
/// never trip.
#[derive(Default)]
pub struct UnboundedMemoryStats {
    used: AtomicU64,
}

impl UnboundedMemoryStats {
    pub fn new() -> Self {
        UnboundedMemoryStats::default()
    }

    pub fn set_used_bytes(&self, used: u64) {
        self.used.store(used, Ordering::Relaxed);
    }
}

impl MemoryStats for UnboundedMemoryStats {
    fn used_bytes(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    fn lower_mark(&self) -> u64 {
        u64::MAX
    }

    fn upper_mark(&self) -> u64 {
        u64::MAX
    }
}

/// Top-level façade wiring every other crate in this workspace into one
/// runnable bucket (§1 "a single bucket's worth of in-memory state and the
/// tasks that keep it coherent with the storage layer"). A production host
/// would run several of these, one per shard; this core runs one
/// `ExecutorPool`/`BgFetcher` pair per `Bucket` rather than sharding further
/// internally, which is the single-shard simplification recorded in
/// DESIGN.md.
pub struct Bucket {
    config: BucketConfig,
    handle: BucketHandle,
    pool: Arc<ExecutorPool>,
    vbuckets: Arc<VBucketMap>,
    storage: Arc<dyn KvStore>,
    bgfetcher: Arc<BgFetcher>,
    replication: Arc<dyn ReplicationHub>,
    memory: Arc<dyn MemoryStats>,
    clock: Arc<dyn Clock>,
}

impl Bucket {
    pub fn new(config: BucketConfig, storage: Arc<dyn KvStore>) -> Arc<Self> {
        Bucket::with_collaborators(config, storage, Arc::new(NullReplicationHub), Arc::new(UnboundedMemoryStats::new()), Arc::new(SystemClock))
    }

    pub fn with_collaborators(
        config: BucketConfig,
        storage: Arc<dyn KvStore>,
        replication: Arc<dyn ReplicationHub>,
        memory: Arc<dyn MemoryStats>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let executor_config = ExecutorConfig {
            readers: config.readers,
            writers: config.writers,
            aux_io: config.aux_io,
            non_io: config.non_io,
            global_thread_cap: None,
            idle_park: std::time::Duration::from_millis(10),
        };
        let pool = ExecutorPool::new(executor_config, clock.clone());
        let handle = BucketHandle(1);
        pool.register_bucket(handle);

        let vbuckets = Arc::new(VBucketMap::new());
        let bgfetcher = BgFetcher::new(
            "shard-0",
            BgFetcherConfig { bg_fetch_delay: config.bg_fetch_delay },
            storage.clone(),
            vbuckets.clone(),
            pool.clone(),
        );
        bgfetcher.start(Some(handle));

        Arc::new(Bucket { config, handle, pool, vbuckets, storage, bgfetcher, replication, memory, clock })
    }

    pub fn config(&self) -> &BucketConfig {
        &self.config
    }

    pub fn vbuckets(&self) -> &Arc<VBucketMap> {
        &self.vbuckets
    }

    pub fn pool(&self) -> &Arc<ExecutorPool> {
        &self.pool
    }

    /// Runs warmup to completion by repeatedly invoking the task's `run`
    /// until it reaches `Done`, then starts the recurring checkpoint
    /// remover (§4.5, §4.6). A real deployment would schedule warmup on the
    /// pool like any other task; running it inline here keeps bucket
    /// construction and warmup completion synchronous for callers that want
    /// to know when traffic can start.
    pub fn warm_up(self: &Arc<Self>) {
        let sink = EngineWarmupSink::new(self.vbuckets.clone(), self.bgfetcher.clone(), self.replication.clone(), self.memory.clone(), self.clock.clone());
        let warmup = Warmup::new(self.storage.clone(), sink, bucket_warmup::WarmupConfig { eviction_policy: self.config.eviction_policy, ..Default::default() }, self.clock.clone());

        let ctx_pool = self.pool.clone();
        loop {
            let task_id = bucket_executor::TaskId(0);
            let ctx = bucket_executor::TaskContext { clock: self.clock.as_ref(), pool: ctx_pool.as_ref(), task_id };
            if matches!(warmup.run(&ctx), bucket_executor::Decision::Done) {
                break;
            }
            if matches!(warmup.state(), bucket_warmup::WarmupState::Done) {
                break;
            }
        }
    }

    /// Starts the recurring checkpoint-remover/cursor-dropper pass (§4.5).
    pub fn start_checkpoint_remover(self: &Arc<Self>) {
        let task = CheckpointRemoverTask::new(
            self.vbuckets.clone(),
            self.replication.clone(),
            self.memory.clone(),
            self.pool.clone(),
            self.config.checkpoint_remover_period,
            Some(self.handle),
        );
        self.pool.schedule(task, Some(self.handle));
    }

    pub fn create_vbucket(&self, id: VBucketId, state: LifecycleState) {
        let vbucket = VBucket::new(id, state, VBucketConfig { checkpoint: self.config.checkpoint.clone() }, self.bgfetcher.clone(), self.clock.clone());
        self.vbuckets.insert(vbucket);
    }

    pub fn set(&self, vbucket: VBucketId, key: impl Into<bytes::Bytes>, value: impl Into<bytes::Bytes>, cas: Option<Cas>) -> Result<Item, Error> {
        let vb = self.vbuckets.get(vbucket).ok_or(Error::NotMyVBucket)?;
        let item = vb.set(key, value, cas)?;
        self.replication.notify_new_data(vbucket);
        Ok(item)
    }

    pub fn delete(&self, vbucket: VBucketId, key: impl Into<bytes::Bytes>, cas: Option<Cas>) -> Result<Item, Error> {
        let vb = self.vbuckets.get(vbucket).ok_or(Error::NotMyVBucket)?;
        let item = vb.delete(key, cas)?;
        self.replication.notify_new_data(vbucket);
        Ok(item)
    }

    pub fn get(&self, vbucket: VBucketId, key: &[u8], waiter: BgFetchWaiter) -> Result<GetOutcome, Error> {
        let vb = self.vbuckets.get(vbucket).ok_or(Error::NotMyVBucket)?;
        vb.get(key, waiter)
    }

    pub fn shutdown(&self) {
        self.bgfetcher.stop();
        self.pool.unregister_bucket(self.handle, true);
        self.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_storage::MemoryKvStore;
    use bucket_vbucket::GetOutcome;

    #[test]
    fn warm_up_with_empty_storage_reaches_done_quickly() {
        let storage = Arc::new(MemoryKvStore::new());
        let bucket = Bucket::new(BucketConfig::default(), storage);
        bucket.warm_up();
        bucket.shutdown();
    }

    #[test]
    fn set_then_get_round_trips_through_the_vbucket() {
        let storage = Arc::new(MemoryKvStore::new());
        let bucket = Bucket::new(BucketConfig::default(), storage);
        bucket.create_vbucket(VBucketId(0), LifecycleState::Active);

        bucket.set(VBucketId(0), "k", "v", None).unwrap();
        match bucket.get(VBucketId(0), b"k", Box::new(|_| panic!("should not bg-fetch a resident key"))).unwrap() {
            GetOutcome::Hit(item) => assert_eq!(item.value().unwrap().as_ref(), b"v"),
            GetOutcome::WouldBlock => panic!("expected a hit"),
        }
        bucket.shutdown();
    }

    #[test]
    fn operations_against_an_unknown_vbucket_fail_fast() {
        let storage = Arc::new(MemoryKvStore::new());
        let bucket = Bucket::new(BucketConfig::default(), storage);
        assert!(matches!(bucket.set(VBucketId(7), "k", "v", None), Err(Error::NotMyVBucket)));
        bucket.shutdown();
    }
}
