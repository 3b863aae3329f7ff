use crate::source::PendingFetchSource;
use crate::waiter::BgFetchWaiter;
use bucket_core::VBucketId;
use bucket_executor::{BucketHandle, Decision, ExecutorPool, Task, TaskClass, TaskContext, TaskId};
use bucket_storage::{GetResult, KvStore};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Floor under the configured bg-fetch delay (`bgfetcher.cc`'s
/// `MIN_SLEEP_TIME`): even with a zero-configured delay the task still
/// snoozes this long, so a storm of `notifyBGEvent` calls cannot spin it.
pub const MIN_SLEEP: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug)]
pub struct BgFetcherConfig {
    pub bg_fetch_delay: Duration,
}

impl Default for BgFetcherConfig {
    fn default() -> Self {
        BgFetcherConfig { bg_fetch_delay: Duration::from_millis(10) }
    }
}

/// One fetcher per shard (§4.3). Holds the atomic "pending" flag and the
/// set of vBuckets with outstanding fetches; the actual per-vBucket queues
/// live behind [`PendingFetchSource`].
pub struct BgFetcher {
    shard: String,
    config: BgFetcherConfig,
    storage: Arc<dyn KvStore>,
    source: Arc<dyn PendingFetchSource>,
    pool: Arc<ExecutorPool>,
    pending: AtomicBool,
    pending_vbuckets: Mutex<HashSet<VBucketId>>,
    task_id: Mutex<Option<TaskId>>,
}

impl BgFetcher {
    pub fn new(
        shard: impl Into<String>,
        config: BgFetcherConfig,
        storage: Arc<dyn KvStore>,
        source: Arc<dyn PendingFetchSource>,
        pool: Arc<ExecutorPool>,
    ) -> Arc<Self> {
        Arc::new(BgFetcher {
            shard: shard.into(),
            config,
            storage,
            source,
            pool,
            pending: AtomicBool::new(false),
            pending_vbuckets: Mutex::new(HashSet::new()),
            task_id: Mutex::new(None),
        })
    }

    /// Schedules the fetcher's task with the pool, remembering its id for
    /// `notify_bg_event`/`stop` (§4.3 `start`).
    pub fn start(self: &Arc<Self>, owner: Option<BucketHandle>) -> TaskId {
        let id = self.pool.schedule(self.clone() as Arc<dyn Task>, owner);
        *self.task_id.lock() = Some(id);
        id
    }

    /// Cancels the fetcher's task (§4.3 `stop`).
    pub fn stop(&self) {
        if let Some(id) = self.task_id.lock().take() {
            self.pool.cancel(id, true);
        }
        self.pending.store(false, Ordering::Release);
    }

    /// Atomically sets "pending" from false→true; on that transition, wakes
    /// the task. O(1) and safe from any thread (§4.3 `notifyBGEvent`).
    pub fn notify_bg_event(&self, vbucket: VBucketId) {
        self.pending_vbuckets.lock().insert(vbucket);
        if !self.pending.swap(true, Ordering::AcqRel) {
            if let Some(id) = *self.task_id.lock() {
                self.pool.wake(id);
            }
        }
    }
}

impl Task for BgFetcher {
    fn class(&self) -> TaskClass {
        TaskClass::Reader
    }

    fn run(&self, ctx: &TaskContext<'_>) -> Decision {
        self.pending.store(false, Ordering::Release);
        let snapshot: Vec<VBucketId> = {
            let mut guard = self.pending_vbuckets.lock();
            let snap = guard.iter().copied().collect();
            guard.clear();
            snap
        };

        for vbucket in snapshot {
            if self.source.vbucket_creation_pending(vbucket) {
                self.pending_vbuckets.lock().insert(vbucket);
                self.pending.store(true, Ordering::Release);
                continue;
            }

            let items = self.source.drain_pending_fetches(vbucket);
            if items.is_empty() {
                continue;
            }

            let mut by_key: HashMap<Vec<u8>, Vec<BgFetchWaiter>> = HashMap::new();
            for item in items {
                by_key.entry(item.key).or_default().push(item.waiter);
            }

            let mut results: HashMap<Vec<u8>, GetResult> =
                by_key.keys().map(|k| (k.clone(), GetResult::not_found())).collect();
            self.storage.get_multi(vbucket, &mut results);

            for (key, waiters) in by_key {
                let result = results.remove(&key).unwrap_or_else(GetResult::not_found);
                for waiter in waiters {
                    waiter(result.clone());
                }
            }
        }

        if !self.pending.load(Ordering::Acquire) {
            let delay = self.config.bg_fetch_delay.max(MIN_SLEEP);
            ctx.pool.snooze(ctx.task_id, delay.as_secs_f64());
            if self.pending.load(Ordering::Acquire) {
                // A notify arrived while we were snoozing above; don't miss
                // a whole delay window waiting for the next wake.
                ctx.pool.snooze(ctx.task_id, 0.0);
            }
        }

        Decision::Reschedule
    }

    fn describe(&self) -> &str {
        &self.shard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waiter::BgFetchItem;
    use bucket_core::{ItemBuilder, SystemClock};
    use bucket_executor::ExecutorConfig;
    use bucket_storage::MemoryKvStore;
    use std::sync::mpsc;

    #[derive(Default)]
    struct TestSource {
        pending: Mutex<HashMap<VBucketId, Vec<BgFetchItem>>>,
        creating: Mutex<HashSet<VBucketId>>,
    }

    impl TestSource {
        fn enqueue(&self, vbucket: VBucketId, item: BgFetchItem) {
            self.pending.lock().entry(vbucket).or_default().push(item);
        }
    }

    impl PendingFetchSource for TestSource {
        fn vbucket_creation_pending(&self, vbucket: VBucketId) -> bool {
            self.creating.lock().contains(&vbucket)
        }

        fn drain_pending_fetches(&self, vbucket: VBucketId) -> Vec<BgFetchItem> {
            self.pending.lock().remove(&vbucket).unwrap_or_default()
        }
    }

    fn small_pool() -> Arc<ExecutorPool> {
        ExecutorPool::new(
            ExecutorConfig {
                readers: 1,
                writers: 1,
                aux_io: 1,
                non_io: 1,
                global_thread_cap: None,
                idle_park: Duration::from_millis(10),
            },
            Arc::new(SystemClock),
        )
    }

    #[test]
    fn notify_drains_and_delivers_result() {
        let vb = VBucketId(0);
        let storage = Arc::new(MemoryKvStore::new());
        storage.set(&ItemBuilder::new(vb, "k").value("v").build());

        let source = Arc::new(TestSource::default());
        let pool = small_pool();
        let fetcher = BgFetcher::new("shard-0", BgFetcherConfig::default(), storage.clone(), source.clone(), pool.clone());
        fetcher.start(None);

        let (tx, rx) = mpsc::channel();
        source.enqueue(vb, BgFetchItem::new(b"k".to_vec(), Box::new(move |result| {
            let _ = tx.send(result);
        })));
        fetcher.notify_bg_event(vb);

        let result = rx.recv_timeout(Duration::from_secs(2)).expect("waiter delivered");
        assert!(result.status.is_ok());
        assert_eq!(result.item.unwrap().value().unwrap().as_ref(), b"v");

        fetcher.stop();
        pool.shutdown();
    }

    #[test]
    fn creation_pending_requeues_vbucket() {
        let vb = VBucketId(1);
        let storage = Arc::new(MemoryKvStore::new());
        let source = Arc::new(TestSource::default());
        source.creating.lock().insert(vb);

        let pool = small_pool();
        let fetcher = BgFetcher::new("shard-1", BgFetcherConfig::default(), storage, source.clone(), pool.clone());
        fetcher.start(None);
        fetcher.notify_bg_event(vb);

        std::thread::sleep(Duration::from_millis(100));
        assert!(fetcher.pending_vbuckets.lock().contains(&vb), "still-creating vBucket stays pending");

        fetcher.stop();
        pool.shutdown();
    }
}
