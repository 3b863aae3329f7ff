use bucket_bgfetcher::BgFetchItem;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A vBucket's own slice of the pending-fetch state (§3 "Pending BG-fetch
/// queue"). `bucket-engine`'s `VBucketMap` fans `PendingFetchSource` calls
/// out to each vBucket's queue.
#[derive(Default)]
pub struct PendingFetchQueue {
    items: Mutex<Vec<BgFetchItem>>,
    /// Set while the vBucket's backing file is still being created (§4.3
    /// `run`, "If the vBucket's storage file is being created").
    creating: AtomicBool,
}

impl PendingFetchQueue {
    pub fn new() -> Self {
        PendingFetchQueue::default()
    }

    pub fn push(&self, item: BgFetchItem) {
        self.items.lock().push(item);
    }

    pub fn drain(&self) -> Vec<BgFetchItem> {
        std::mem::take(&mut *self.items.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn set_creating(&self, creating: bool) {
        self.creating.store(creating, Ordering::Release);
    }

    pub fn is_creating(&self) -> bool {
        self.creating.load(Ordering::Acquire)
    }
}
