use crate::notify::{MemoryStats, ReplicationHub};
use crate::vbucket_map::VBucketMap;
use bucket_bgfetcher::BgFetcher;
use bucket_checkpoint::SnapshotRange;
use bucket_core::{Clock, Item, ItemBuilder, VBucketId};
use bucket_storage::VBucketState;
use bucket_vbucket::{LifecycleState, VBucket, VBucketConfig};
use bucket_warmup::{AccessLogStatus, WarmupSink};
use std::sync::Arc;

fn parse_state(state: &str) -> LifecycleState {
    match state {
        "active" => LifecycleState::Active,
        "replica" => LifecycleState::Replica,
        "pending" => LifecycleState::Pending,
        _ => LifecycleState::Dead,
    }
}

/// Bridges `bucket_warmup::WarmupSink` to the engine's live state: vBucket
/// construction, the hash index, and the traffic-enable gate (§4.6).
///
/// Simplification: a warmed-up vBucket's `CheckpointManager` always starts
/// fresh at seqno 0 rather than fast-forwarding to the persisted
/// `highSeqno` — `CheckpointManager` has no "start at seqno N" constructor,
/// and building one is out of proportion to what this core needs to
/// demonstrate; the persisted snapshot range is still recorded via
/// `record_persisted_snapshot` so `notifyOnPersistence` waiters registered
/// during warmup resolve correctly. `VBucketState` also doesn't carry a
/// separate `highSeqno` field (§6.2 lists it as `snap_start`/`snap_end`
/// only), so `snap_end` stands in for it when deciding whether an unclean
/// shutdown's failover entry lands at `snapEnd` or `snapStart` (§4.6 stage
/// 2) — in practice the two coincide once persistence has caught up.
pub struct EngineWarmupSink {
    vbuckets: Arc<VBucketMap>,
    bgfetcher: Arc<BgFetcher>,
    replication: Arc<dyn ReplicationHub>,
    memory: Arc<dyn MemoryStats>,
    clock: Arc<dyn Clock>,
}

impl EngineWarmupSink {
    pub fn new(
        vbuckets: Arc<VBucketMap>,
        bgfetcher: Arc<BgFetcher>,
        replication: Arc<dyn ReplicationHub>,
        memory: Arc<dyn MemoryStats>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(EngineWarmupSink { vbuckets, bgfetcher, replication, memory, clock })
    }
}

impl WarmupSink for EngineWarmupSink {
    fn create_vbucket(&self, state: VBucketState, unclean_shutdown: bool) {
        let lifecycle = parse_state(&state.state);
        let vbucket = VBucket::new(state.vbucket, lifecycle, VBucketConfig::default(), self.bgfetcher.clone(), self.clock.clone());
        vbucket.record_persisted_snapshot(SnapshotRange { start: state.snap_start, end: state.snap_end });

        if unclean_shutdown && lifecycle == LifecycleState::Active {
            // `highSeqno` isn't a field this core's persisted vbucket state
            // carries separately; `snap_end` stands in for it (see the
            // struct doc comment above).
            let vb_uuid = state.vbucket.0 as u64;
            vbucket.failover_table().append(vb_uuid, state.snap_end);
        }

        self.vbuckets.insert(vbucket);
        self.replication.notify_state_change(state.vbucket, lifecycle);
    }

    fn insert_key_meta(&self, vbucket: VBucketId, key: Vec<u8>) {
        if let Some(vb) = self.vbuckets.get(vbucket) {
            let item = ItemBuilder::new(vbucket, key).build();
            vb.hash_table().insert_meta_only(item);
        }
    }

    fn insert_item(&self, item: Item) {
        if let Some(vb) = self.vbuckets.get(item.vbucket()) {
            vb.hash_table().upsert(item);
        }
    }

    fn access_log(&self, _vbucket: VBucketId) -> AccessLogStatus {
        // No on-disk access-log file exists in this core's storage
        // abstraction (§6.1 names no such API) — warmup always falls
        // through to the full KV-pair/data-loading stages.
        AccessLogStatus::Missing
    }

    fn traffic_threshold_reached(&self) -> bool {
        self.memory.over_upper_mark()
    }

    fn enable_traffic(&self) {
        tracing::debug!("warmup complete, traffic enabled");
    }
}
