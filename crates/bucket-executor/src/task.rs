use crate::handle::TaskId;
use crate::pool::ExecutorPool;
use bucket_core::Clock;
use std::sync::Arc;

/// The four task classes of §4.1, each with its own configured worker count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskClass {
    Reader,
    Writer,
    AuxIO,
    NonIO,
}

impl TaskClass {
    pub const ALL: [TaskClass; 4] = [TaskClass::Reader, TaskClass::Writer, TaskClass::AuxIO, TaskClass::NonIO];
}

/// Selects which bucket's queue a task enters once the pool is in capacity
/// mode (§4.1 "Capacity mode").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadPriority {
    High,
    Low,
}

/// What a task's `run()` tells the pool to do next (§4.1 "Failure
/// semantics"). Replaces the source's `bool` return with a named
/// enumeration per the Design Notes (§9) guidance to avoid a bare boolean.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Re-queue per the task's current snooze time.
    Reschedule,
    /// Do not reschedule; the task is finished.
    Done,
}

/// Context threaded through the `run()` call path, replacing the source's
/// implicit thread-local `ObjectRegistry::onSwitchThread` (§9) with an
/// explicit parameter the pool rebinds on every dispatch. `pool`/`task_id`
/// let a task set its own re-run delay mid-`run()` (e.g. the bg-fetcher
/// snoozing itself for zero when more work arrived during the batch) the
/// same way the source calls `snooze()` on itself.
pub struct TaskContext<'a> {
    pub clock: &'a dyn Clock,
    pub pool: &'a ExecutorPool,
    pub task_id: TaskId,
}

/// A single trait-style interface standing in for the source's task class
/// hierarchy (§9 "Tasks as inheritance hierarchies"). Per-task priority and
/// class are fields supplied at construction, not subclass attributes.
pub trait Task: Send + Sync {
    fn class(&self) -> TaskClass;

    fn workload_priority(&self) -> WorkloadPriority {
        WorkloadPriority::High
    }

    /// Whether bucket shutdown must wait for this task to reach a terminal
    /// state before completing (§4.1 `unregisterBucket`).
    fn block_shutdown(&self) -> bool {
        false
    }

    fn run(&self, ctx: &TaskContext<'_>) -> Decision;

    fn describe(&self) -> &str;
}

pub(crate) type TaskArc = Arc<dyn Task>;
