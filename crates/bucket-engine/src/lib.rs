//! Wiring crate: the single place that owns a `VBucketMap`, an
//! `ExecutorPool`, a `BgFetcher`, and the recurring tasks that keep them
//! coherent with the storage layer (§1, §4.5, §4.6).

pub use bucket::{Bucket, UnboundedMemoryStats};
pub use checkpoint_remover::{CheckpointRemoverTask, CursorDropperTask};
pub use config::{BucketConfig, BucketConfigBuilder};
pub use notify::{MemoryStats, NullReplicationHub, ReplicationHub};
pub use vbucket_map::VBucketMap;
pub use warmup_sink::EngineWarmupSink;

mod bucket;
mod checkpoint_remover;
mod config;
mod notify;
mod vbucket_map;
mod warmup_sink;
