use crate::handle::{BucketHandle, TaskHandle, TaskId, TaskState};
use crate::queue::TaskQueue;
use crate::task::{Task, TaskClass, TaskContext, WorkloadPriority};
use bucket_core::Clock;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Worker-thread counts per class and the optional global cap that toggles
/// capacity mode (§4.1 "Capacity mode").
#[derive(Clone, Copy, Debug)]
pub struct ExecutorConfig {
    pub readers: usize,
    pub writers: usize,
    pub aux_io: usize,
    pub non_io: usize,
    pub global_thread_cap: Option<usize>,
    pub idle_park: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            readers: 4,
            writers: 4,
            aux_io: 2,
            non_io: 2,
            global_thread_cap: None,
            idle_park: Duration::from_millis(250),
        }
    }
}

impl ExecutorConfig {
    fn threads_for(&self, class: TaskClass) -> usize {
        match class {
            TaskClass::Reader => self.readers,
            TaskClass::Writer => self.writers,
            TaskClass::AuxIO => self.aux_io,
            TaskClass::NonIO => self.non_io,
        }
    }

    fn total_threads(&self) -> usize {
        self.readers + self.writers + self.aux_io + self.non_io
    }
}

struct Queues {
    reader: Arc<TaskQueue>,
    writer: Arc<TaskQueue>,
    aux_io: Arc<TaskQueue>,
    non_io: Arc<TaskQueue>,
}

impl Queues {
    fn get(&self, class: TaskClass) -> &Arc<TaskQueue> {
        match class {
            TaskClass::Reader => &self.reader,
            TaskClass::Writer => &self.writer,
            TaskClass::AuxIO => &self.aux_io,
            TaskClass::NonIO => &self.non_io,
        }
    }
}

/// Schedules and runs [`Task`]s on a fixed-size worker-thread set, bucketed
/// by task class (§4.1).
pub struct ExecutorPool {
    config: ExecutorConfig,
    clock: Arc<dyn Clock>,
    queues: Queues,
    locator: DashMap<TaskId, Arc<TaskHandle>>,
    buckets: DashMap<BucketHandle, Arc<Mutex<HashSet<TaskId>>>>,
    next_id: AtomicU64,
    capacity_mode: bool,
    shutting_down: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecutorPool {
    pub fn new(config: ExecutorConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        let capacity_mode = config.global_thread_cap.map(|cap| config.total_threads() > cap).unwrap_or(false);
        let pool = Arc::new(ExecutorPool {
            config,
            clock,
            queues: Queues {
                reader: Arc::new(TaskQueue::new()),
                writer: Arc::new(TaskQueue::new()),
                aux_io: Arc::new(TaskQueue::new()),
                non_io: Arc::new(TaskQueue::new()),
            },
            locator: DashMap::new(),
            buckets: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity_mode,
            shutting_down: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        });
        pool.spawn_workers();
        pool
    }

    fn spawn_workers(self: &Arc<Self>) {
        let mut workers = self.workers.lock();
        for class in TaskClass::ALL {
            for worker_idx in 0..self.config.threads_for(class) {
                let pool = Arc::clone(self);
                let handle = std::thread::Builder::new()
                    .name(format!("{class:?}-{worker_idx}"))
                    .spawn(move || pool.worker_loop(class))
                    .expect("failed to spawn executor pool worker thread");
                workers.push(handle);
            }
        }
    }

    fn worker_loop(self: Arc<Self>, class: TaskClass) {
        let queue = self.queues.get(class).clone();
        let idle_park = self.config.idle_park;
        loop {
            if self.shutting_down.load(Ordering::Acquire) {
                return;
            }
            let clock = Arc::clone(&self.clock);
            let now = move || clock.hrtime();
            match queue.pop_ready(now, idle_park) {
                Some(id) => self.dispatch(id),
                None => {
                    if self.shutting_down.load(Ordering::Acquire) {
                        return;
                    }
                }
            }
        }
    }

    fn dispatch(&self, id: TaskId) {
        let Some(entry) = self.locator.get(&id) else { return };
        let handle = Arc::clone(entry.value());
        drop(entry);

        if handle.is_dead() {
            self.maybe_erase(&handle);
            return;
        }
        if !handle.begin_run() {
            // Already running on another thread (shouldn't happen for a
            // single dispatch, but cooperative cancellation means a stale
            // queue entry can race with a fresh wake()).
            return;
        }

        let ctx = TaskContext { clock: self.clock.as_ref(), pool: self, task_id: id };
        tracing::debug!(task = handle.task.describe(), class = ?handle.class, "running task");
        let decision = handle.task.run(&ctx);
        handle.end_run();

        if handle.is_dead() {
            self.maybe_erase(&handle);
            return;
        }

        match decision {
            crate::task::Decision::Done => {
                handle.set_state(TaskState::Dead);
            }
            crate::task::Decision::Reschedule => {
                let now = self.clock.hrtime();
                let wake_at = now + handle.snooze_duration();
                handle.set_wake_at(wake_at);
                handle.set_state(TaskState::Snoozed);
                let workload = self.effective_workload(handle.workload);
                self.queues.get(handle.class).push(workload, wake_at, now, id);
            }
        }
    }

    fn maybe_erase(&self, handle: &TaskHandle) {
        if handle.pending_erase.load(Ordering::Acquire) {
            self.locator.remove(&handle.id);
            if let Some(owner) = handle.owner {
                if let Some(set) = self.buckets.get(&owner) {
                    set.lock().remove(&handle.id);
                }
            }
        }
    }

    fn effective_workload(&self, workload: WorkloadPriority) -> WorkloadPriority {
        if self.capacity_mode {
            workload
        } else {
            WorkloadPriority::High
        }
    }

    /// Registers `task`, making it eligible for the given class queue
    /// immediately. Returns a stable id (§4.1 `schedule`).
    pub fn schedule(&self, task: Arc<dyn Task>, owner: Option<BucketHandle>) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let class = task.class();
        let workload = task.workload_priority();
        let now = self.clock.hrtime();
        let handle = Arc::new(TaskHandle::new(id, task, class, workload, owner, now));
        self.locator.insert(id, Arc::clone(&handle));
        if let Some(owner) = owner {
            self.buckets.entry(owner).or_insert_with(|| Arc::new(Mutex::new(HashSet::new()))).lock().insert(id);
        }
        self.queues.get(class).push(self.effective_workload(workload), now, now, id);
        id
    }

    /// Moves a snoozed or future-scheduled task to the ready position
    /// immediately. Returns `false` if `task_id` is unknown (§4.1 `wake`).
    pub fn wake(&self, task_id: TaskId) -> bool {
        let Some(entry) = self.locator.get(&task_id) else { return false };
        let handle = entry.value();
        if handle.is_dead() {
            return false;
        }
        let now = self.clock.hrtime();
        handle.set_wake_at(now);
        handle.set_state(TaskState::Running);
        let class = handle.class;
        let workload = self.effective_workload(handle.workload);
        drop(entry);
        self.queues.get(class).push(workload, now, now, task_id);
        true
    }

    /// Marks `task_id` dead so it will not execute again; with `erase`,
    /// removes its registration once any in-flight invocation completes
    /// (§4.1 `cancel`). Idempotent (§8 P7).
    pub fn cancel(&self, task_id: TaskId, erase: bool) -> bool {
        let Some(entry) = self.locator.get(&task_id) else { return false };
        let handle = Arc::clone(entry.value());
        drop(entry);
        handle.set_state(TaskState::Dead);
        if erase {
            handle.pending_erase.store(true, Ordering::Release);
            self.maybe_erase(&handle);
        }
        true
    }

    /// Reschedules `task_id` for at least `seconds` in the future (§4.1
    /// `snooze`). The duration also becomes the task's default re-run delay
    /// the next time it returns [`crate::Decision::Reschedule`]. Takes
    /// fractional seconds, matching the source's `double`-typed `snooze()`
    /// (sub-second delays like the bg-fetcher's `MIN_SLEEP` need this).
    pub fn snooze(&self, task_id: TaskId, seconds: f64) -> bool {
        let Some(entry) = self.locator.get(&task_id) else { return false };
        let handle = entry.value();
        if handle.is_dead() {
            return false;
        }
        let duration = Duration::from_secs_f64(seconds.max(0.0));
        handle.set_snooze_duration(duration);
        let now = self.clock.hrtime();
        let wake_at = now + duration;
        handle.set_wake_at(wake_at);
        handle.set_state(TaskState::Snoozed);
        let class = handle.class;
        let workload = self.effective_workload(handle.workload);
        drop(entry);
        self.queues.get(class).push(workload, wake_at, now, task_id);
        true
    }

    /// Associates future `schedule` calls carrying this handle with a
    /// bucket, for aggregate cancellation (§4.1 `registerBucket`).
    pub fn register_bucket(&self, handle: BucketHandle) {
        self.buckets.entry(handle).or_insert_with(|| Arc::new(Mutex::new(HashSet::new())));
    }

    /// Cancels every task owned by `handle` (respecting `block_shutdown`
    /// unless `force`) and waits for in-flight tasks to complete (§4.1
    /// `unregisterBucket`).
    pub fn unregister_bucket(&self, handle: BucketHandle, force: bool) {
        let Some((_, set)) = self.buckets.remove(&handle) else { return };
        let ids: Vec<TaskId> = set.lock().iter().copied().collect();
        for id in &ids {
            self.cancel(*id, true);
        }
        if force {
            return;
        }
        loop {
            let still_blocking = ids.iter().any(|id| {
                self.locator.get(id).map(|h| h.task.block_shutdown()).unwrap_or(false)
            });
            if !still_blocking {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Stops accepting new dispatches and joins every worker thread. Waits
    /// for tasks with `block_shutdown()` set, the way bucket shutdown does
    /// (§4.1 "Failure semantics": "shutdown waits for non-dead tasks whose
    /// `blockShutdown` is set").
    pub fn shutdown(&self) {
        loop {
            let still_blocking = self
                .locator
                .iter()
                .any(|e| !e.value().is_dead() && e.value().task.block_shutdown());
            if !still_blocking {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.shutting_down.store(true, Ordering::Release);
        self.queues.reader.shutdown();
        self.queues.writer.shutdown();
        self.queues.aux_io.shutdown();
        self.queues.non_io.shutdown();
        let mut workers = self.workers.lock();
        for worker in workers.drain(..) {
            let _ = worker.join();
        }
    }

    pub fn task_count(&self) -> usize {
        self.locator.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Decision;
    use bucket_core::SystemClock;
    use std::sync::atomic::AtomicUsize;

    struct CountingTask {
        class: TaskClass,
        runs: Arc<AtomicUsize>,
        max_runs: usize,
    }

    impl Task for CountingTask {
        fn class(&self) -> TaskClass {
            self.class
        }

        fn run(&self, _ctx: &TaskContext<'_>) -> Decision {
            let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.max_runs {
                Decision::Done
            } else {
                Decision::Reschedule
            }
        }

        fn describe(&self) -> &str {
            "counting-task"
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
                idle_park: Duration::from_millis(20),
            },
            Arc::new(SystemClock),
        )
    }

    #[test]
    fn task_runs_until_done() {
        let pool = small_pool();
        let runs = Arc::new(AtomicUsize::new(0));
        let task = Arc::new(CountingTask { class: TaskClass::NonIO, runs: runs.clone(), max_runs: 3 });
        pool.schedule(task, None);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while runs.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        pool.shutdown();
    }

    #[test]
    fn cancel_is_idempotent() {
        let pool = small_pool();
        let runs = Arc::new(AtomicUsize::new(0));
        let task = Arc::new(CountingTask { class: TaskClass::NonIO, runs, max_runs: 1000 });
        let id = pool.schedule(task, None);

        assert!(pool.cancel(id, false));
        assert!(pool.cancel(id, false));
        assert!(pool.cancel(id, true));
        assert!(!pool.wake(id));
        pool.shutdown();
    }

    #[test]
    fn wake_unknown_task_returns_false() {
        let pool = small_pool();
        assert!(!pool.wake(TaskId(9999)));
        assert!(!pool.cancel(TaskId(9999), false));
        assert!(!pool.snooze(TaskId(9999), 1.0));
        pool.shutdown();
    }

    #[test]
    fn unregister_bucket_cancels_its_tasks() {
        let pool = small_pool();
        let bucket = BucketHandle(1);
        pool.register_bucket(bucket);
        let runs = Arc::new(AtomicUsize::new(0));
        let task = Arc::new(CountingTask { class: TaskClass::Reader, runs, max_runs: 1000 });
        let id = pool.schedule(task, Some(bucket));

        pool.unregister_bucket(bucket, false);
        assert!(!pool.wake(id));
        pool.shutdown();
    }
}
