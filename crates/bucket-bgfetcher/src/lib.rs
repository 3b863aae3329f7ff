//! The Background Fetcher (§4.3): batches cache misses for a shard and
//! services them from the storage KV-store with one `getMulti` per vBucket
//! per round.

pub use fetcher::{BgFetcher, BgFetcherConfig};
pub use source::PendingFetchSource;
pub use waiter::{BgFetchItem, BgFetchWaiter};

mod fetcher;
mod source;
mod waiter;
