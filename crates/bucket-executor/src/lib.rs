//! The Executor Pool (§4.1): a fixed-size worker-thread set partitioned by
//! task class, with cooperative cancellation, wake and snooze.

pub use handle::{BucketHandle, TaskId};
pub use pool::{ExecutorConfig, ExecutorPool};
pub use task::{Decision, Task, TaskClass, TaskContext, WorkloadPriority};

mod handle;
mod pool;
mod queue;
mod task;
