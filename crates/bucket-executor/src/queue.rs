use crate::handle::TaskId;
use crate::task::WorkloadPriority;
use parking_lot::{Condvar, Mutex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;

/// Per-class task queue (§4.1). Each class owns one of these; it is shared
/// by every worker thread assigned to that class. Tasks not yet due live in
/// a `future` min-heap keyed by wake time; `promote_due` moves them into the
/// `ready` deque once their wake time has passed, mirroring the source's
/// `futureQueue`/`readyQueue` split per `TaskQueue`.
pub(crate) struct TaskQueue {
    state: Mutex<QueueState>,
    condvar: Condvar,
}

struct QueueState {
    high_ready: VecDeque<TaskId>,
    low_ready: VecDeque<TaskId>,
    high_future: BinaryHeap<Reverse<(Duration, TaskId)>>,
    low_future: BinaryHeap<Reverse<(Duration, TaskId)>>,
    /// Counts polls to implement the ~4:1 high:low alternation (§4.1).
    poll_count: u32,
    shutdown: bool,
}

/// 4 high-priority pops for every 1 low-priority pop, per §4.1.
const HIGH_LOW_RATIO: u32 = 4;

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue {
            state: Mutex::new(QueueState {
                high_ready: VecDeque::new(),
                low_ready: VecDeque::new(),
                high_future: BinaryHeap::new(),
                low_future: BinaryHeap::new(),
                poll_count: 0,
                shutdown: false,
            }),
            condvar: Condvar::new(),
        }
    }

    pub fn push(&self, workload: WorkloadPriority, wake_at: Duration, now: Duration, id: TaskId) {
        let mut state = self.state.lock();
        if wake_at <= now {
            match workload {
                WorkloadPriority::High => state.high_ready.push_back(id),
                WorkloadPriority::Low => state.low_ready.push_back(id),
            }
        } else {
            match workload {
                WorkloadPriority::High => state.high_future.push(Reverse((wake_at, id))),
                WorkloadPriority::Low => state.low_future.push(Reverse((wake_at, id))),
            }
        }
        self.condvar.notify_one();
    }

    fn promote_due(state: &mut QueueState, now: Duration) {
        while let Some(&Reverse((wake_at, _))) = state.high_future.peek() {
            if wake_at > now {
                break;
            }
            let Reverse((_, id)) = state.high_future.pop().unwrap();
            state.high_ready.push_back(id);
        }
        while let Some(&Reverse((wake_at, _))) = state.low_future.peek() {
            if wake_at > now {
                break;
            }
            let Reverse((_, id)) = state.low_future.pop().unwrap();
            state.low_ready.push_back(id);
        }
    }

    fn next_wake(state: &QueueState) -> Option<Duration> {
        let hi = state.high_future.peek().map(|Reverse((t, _))| *t);
        let lo = state.low_future.peek().map(|Reverse((t, _))| *t);
        match (hi, lo) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Blocks the calling worker until a task is ready, the queue is
    /// shutting down, or `idle_park` elapses (whichever first); returns the
    /// next `TaskId` to run, or `None` on shutdown/timeout.
    pub fn pop_ready(&self, now: impl Fn() -> Duration, idle_park: Duration) -> Option<TaskId> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            Self::promote_due(&mut state, now());

            state.poll_count = (state.poll_count + 1) % (HIGH_LOW_RATIO + 1);
            let prefer_high = state.poll_count != 0;

            let picked = if prefer_high {
                state.high_ready.pop_front().or_else(|| state.low_ready.pop_front())
            } else {
                state.low_ready.pop_front().or_else(|| state.high_ready.pop_front())
            };
            if let Some(id) = picked {
                return Some(id);
            }

            let wait_for = match Self::next_wake(&state) {
                Some(at) => at.saturating_sub(now()).min(idle_park),
                None => idle_park,
            };
            let wait_for = wait_for.max(Duration::from_millis(1));
            self.condvar.wait_for(&mut state, wait_for);
        }
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        self.condvar.notify_all();
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.high_ready.len() + state.low_ready.len() + state.high_future.len() + state.low_future.len()
    }
}
