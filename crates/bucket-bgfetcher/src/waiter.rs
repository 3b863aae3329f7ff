use bucket_storage::GetResult;

/// Delivers a completed fetch to exactly one waiter (§4.4 "Get (miss)").
/// Boxed so a vBucket's pending-fetch queue can hold a heterogeneous set of
/// callbacks without the bg-fetcher crate knowing anything about requester
/// internals (connection handles, condvars, ...).
pub type BgFetchWaiter = Box<dyn FnOnce(GetResult) + Send>;

/// One outstanding read against a key that missed the hash index. Several
/// of these can share a key — the fetcher resolves all of them from a
/// single storage lookup, in registration order.
pub struct BgFetchItem {
    pub key: Vec<u8>,
    pub waiter: BgFetchWaiter,
}

impl BgFetchItem {
    pub fn new(key: Vec<u8>, waiter: BgFetchWaiter) -> Self {
        BgFetchItem { key, waiter }
    }
}
