use crate::task::{TaskArc, TaskClass, WorkloadPriority};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

/// Stable identifier returned by [`crate::ExecutorPool::schedule`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// Opaque handle identifying an engine/bucket for aggregate cancellation
/// (§4.1 `registerBucket`/`unregisterBucket`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BucketHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum TaskState {
    Running = 0,
    Snoozed = 1,
    Dead = 2,
}

impl TaskState {
    fn from_u8(v: u8) -> TaskState {
        match v {
            0 => TaskState::Running,
            1 => TaskState::Snoozed,
            _ => TaskState::Dead,
        }
    }
}

/// The pool's registration record for one scheduled task. Shared between the
/// worker loop and the public `wake`/`cancel`/`snooze` API via `Arc`.
pub(crate) struct TaskHandle {
    pub id: TaskId,
    pub task: TaskArc,
    pub class: TaskClass,
    pub workload: WorkloadPriority,
    pub owner: Option<BucketHandle>,
    state: AtomicU8,
    /// Monotonic-clock nanoseconds at which this task is next eligible to
    /// run; compared against `Clock::hrtime()`.
    wake_at_nanos: AtomicU64,
    /// Set by `cancel(id, erase = true)` while the task is mid-run; the
    /// worker removes the registration itself once `run()` returns, instead
    /// of the caller blocking (§4.1 "at-most-once cancel").
    pub(crate) pending_erase: std::sync::atomic::AtomicBool,
    in_flight: std::sync::atomic::AtomicBool,
    /// Remembered re-run delay; applied when `run()` returns
    /// `Decision::Reschedule` (§4.1 "re-queue per my current snooze time").
    snooze_nanos: AtomicU64,
}

impl TaskHandle {
    pub fn new(
        id: TaskId,
        task: TaskArc,
        class: TaskClass,
        workload: WorkloadPriority,
        owner: Option<BucketHandle>,
        wake_at: Duration,
    ) -> Self {
        TaskHandle {
            id,
            task,
            class,
            workload,
            owner,
            state: AtomicU8::new(TaskState::Running as u8),
            wake_at_nanos: AtomicU64::new(wake_at.as_nanos() as u64),
            pending_erase: std::sync::atomic::AtomicBool::new(false),
            in_flight: std::sync::atomic::AtomicBool::new(false),
            snooze_nanos: AtomicU64::new(0),
        }
    }

    pub fn snooze_duration(&self) -> Duration {
        Duration::from_nanos(self.snooze_nanos.load(Ordering::Acquire))
    }

    pub fn set_snooze_duration(&self, duration: Duration) {
        self.snooze_nanos.store(duration.as_nanos() as u64, Ordering::Release);
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn wake_at(&self) -> Duration {
        Duration::from_nanos(self.wake_at_nanos.load(Ordering::Acquire))
    }

    pub fn set_wake_at(&self, at: Duration) {
        self.wake_at_nanos.store(at.as_nanos() as u64, Ordering::Release);
    }

    pub fn is_dead(&self) -> bool {
        self.state() == TaskState::Dead
    }

    pub fn begin_run(&self) -> bool {
        // Exactly one worker may run a given task at a time; a concurrent
        // wake()/snooze() while running only updates `wake_at`, it never
        // causes a second dispatch.
        !self.in_flight.swap(true, Ordering::AcqRel)
    }

    pub fn end_run(&self) {
        self.in_flight.store(false, Ordering::Release);
    }
}
