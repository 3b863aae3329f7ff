use crate::waiter::BgFetchItem;
use bucket_core::VBucketId;

/// What the fetcher needs from whatever owns the per-vBucket pending-fetch
/// queues (`bucket-vbucket`'s `VBucketMap`, in the full engine). Kept as a
/// trait seam here so this crate does not depend on `bucket-vbucket`,
/// mirroring the storage `KvStore` trait seam in `bucket-storage`.
pub trait PendingFetchSource: Send + Sync {
    /// True while the vBucket's backing file is still being created — the
    /// fetcher must not attempt a `getMulti` against it yet (§4.3 `run`).
    fn vbucket_creation_pending(&self, vbucket: VBucketId) -> bool;

    /// Removes and returns every currently queued [`BgFetchItem`] for
    /// `vbucket`. An empty vec means there was nothing to do.
    fn drain_pending_fetches(&self, vbucket: VBucketId) -> Vec<BgFetchItem>;
}
