use bucket_core::VBucketId;
use bucket_vbucket::LifecycleState;

/// The engine's one outward notification seam (§6.3 "Notification of
/// replication connections on new data, new open checkpoint, and vBucket
/// state change"). Real replication connections live outside this core
/// (§1); this trait is what they implement to receive the fan-out.
pub trait ReplicationHub: Send + Sync {
    fn notify_new_data(&self, vbucket: VBucketId);
    fn notify_new_open_checkpoint(&self, vbucket: VBucketId);
    fn notify_state_change(&self, vbucket: VBucketId, state: LifecycleState);

    /// Asks whichever connection holds `cursor_name` on `vbucket` to give
    /// it up (§4.5 pass 2). May refuse, e.g. if dropping would violate a
    /// replication invariant on that connection's side.
    fn request_drop_cursor(&self, vbucket: VBucketId, cursor_name: &str) -> bool;
}

/// A `ReplicationHub` that accepts every cursor-drop request and otherwise
/// does nothing — useful for a bucket run with no attached replicas, and
/// as the default in tests.
#[derive(Default)]
pub struct NullReplicationHub;

impl ReplicationHub for NullReplicationHub {
    fn notify_new_data(&self, _vbucket: VBucketId) {}

    fn notify_new_open_checkpoint(&self, _vbucket: VBucketId) {}

    fn notify_state_change(&self, _vbucket: VBucketId, _state: LifecycleState) {}

    fn request_drop_cursor(&self, _vbucket: VBucketId, _cursor_name: &str) -> bool {
        true
    }
}

/// Current memory usage against the low/high watermarks driving the cursor
/// dropper (§4.5 pass 2) and warmup's traffic-enable gate (§4.6).
pub trait MemoryStats: Send + Sync {
    fn used_bytes(&self) -> u64;
    fn lower_mark(&self) -> u64;
    fn upper_mark(&self) -> u64;

    fn over_upper_mark(&self) -> bool {
        self.used_bytes() > self.upper_mark()
    }
}
