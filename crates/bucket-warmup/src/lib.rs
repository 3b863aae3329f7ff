//! Warmup: the staged recovery pipeline a bucket runs before accepting
//! client traffic (§4.6).

pub use sink::{AccessLogStatus, WarmupSink};
pub use state::{EvictionPolicy, WarmupState};
pub use warmup::{Warmup, WarmupConfig};

mod sink;
mod state;
mod warmup;

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_core::{Item, ItemBuilder, SeqNo, SystemClock, VBucketId};
    use bucket_executor::{ExecutorConfig, ExecutorPool, Task, TaskContext};
    use bucket_storage::{KvStore, MemoryKvStore, VBucketState};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct TestSink {
        created: Mutex<Vec<VBucketId>>,
        inserted: Mutex<Vec<Item>>,
        traffic_enabled: AtomicBool,
        threshold_reached: AtomicBool,
    }

    impl WarmupSink for TestSink {
        fn create_vbucket(&self, state: VBucketState, _unclean_shutdown: bool) {
            self.created.lock().push(state.vbucket);
        }

        fn insert_key_meta(&self, _vbucket: VBucketId, _key: Vec<u8>) {}

        fn insert_item(&self, item: Item) {
            self.inserted.lock().push(item);
        }

        fn access_log(&self, _vbucket: VBucketId) -> AccessLogStatus {
            AccessLogStatus::Missing
        }

        fn traffic_threshold_reached(&self) -> bool {
            self.threshold_reached.load(Ordering::Acquire)
        }

        fn enable_traffic(&self) {
            self.traffic_enabled.store(true, Ordering::Release);
        }
    }

    fn drive(warmup: &Warmup, pool: &ExecutorPool) {
        let clock = Arc::new(SystemClock);
        let ctx = TaskContext { clock: clock.as_ref(), pool, task_id: bucket_executor::TaskId(0) };
        let mut guard = 0;
        while warmup.state() != WarmupState::Done && guard < 64 {
            warmup.run(&ctx);
            guard += 1;
        }
    }

    #[test]
    fn full_eviction_pipeline_reaches_done_without_access_log() {
        let storage = Arc::new(MemoryKvStore::new());
        storage.seed(ItemBuilder::new(VBucketId(0), "a").value("1").by_seqno(SeqNo(1)).build());
        storage.snapshot_vbucket(
            VBucketId(0),
            VBucketState::from_last_sequence(VBucketId(0), SeqNo(1)),
            bucket_storage::SnapshotMode::WithCommit,
        ).unwrap();

        let sink = Arc::new(TestSink::default());
        let clock = Arc::new(SystemClock);
        let config = WarmupConfig { eviction_policy: EvictionPolicy::Full, batch_size: 10 };
        let warmup = Warmup::new(storage, sink.clone(), config, clock.clone());

        let pool = ExecutorPool::new(
            ExecutorConfig { readers: 1, writers: 1, aux_io: 1, non_io: 1, global_thread_cap: None, idle_park: Duration::from_millis(10) },
            clock,
        );
        drive(&warmup, &pool);

        assert_eq!(warmup.state(), WarmupState::Done);
        assert_eq!(sink.created.lock().len(), 1);
        assert!(sink.traffic_enabled.load(Ordering::Acquire));
        pool.shutdown();
    }

    #[test]
    fn traffic_threshold_short_circuits_to_done() {
        let storage = Arc::new(MemoryKvStore::new());
        let sink = Arc::new(TestSink::default());
        sink.threshold_reached.store(true, Ordering::Release);
        let clock = Arc::new(SystemClock);
        let warmup = Warmup::new(storage, sink.clone(), WarmupConfig::default(), clock.clone());

        let pool = ExecutorPool::new(
            ExecutorConfig { readers: 1, writers: 1, aux_io: 1, non_io: 1, global_thread_cap: None, idle_park: Duration::from_millis(10) },
            clock,
        );
        // Initialize always runs once regardless of the threshold, then
        // the very next stage boundary sees it and stops.
        drive(&warmup, &pool);
        assert_eq!(warmup.state(), WarmupState::Done);
        assert!(sink.traffic_enabled.load(Ordering::Acquire));
        pool.shutdown();
    }

    #[test]
    fn stop_forces_done_regardless_of_stage() {
        let storage = Arc::new(MemoryKvStore::new());
        let sink = Arc::new(TestSink::default());
        let clock = Arc::new(SystemClock);
        let warmup = Warmup::new(storage, sink, WarmupConfig::default(), clock.clone());

        let pool = ExecutorPool::new(
            ExecutorConfig { readers: 1, writers: 1, aux_io: 1, non_io: 1, global_thread_cap: None, idle_park: Duration::from_millis(10) },
            clock.clone(),
        );
        let ctx = TaskContext { clock: clock.as_ref(), pool: pool.as_ref(), task_id: bucket_executor::TaskId(0) };
        warmup.run(&ctx);
        assert_eq!(warmup.state(), WarmupState::CreateVBuckets);

        warmup.stop();
        assert_eq!(warmup.state(), WarmupState::Done);
        pool.shutdown();
    }
}
