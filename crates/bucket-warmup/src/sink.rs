use bucket_core::{Item, VBucketId};
use bucket_storage::VBucketState;

/// Outcome of reading a per-vBucket access log (§4.6 stage 6). Access-log
/// files are themselves outside this core's storage abstraction (§6.1 names
/// no such API), so reading one — and falling back to the `.old` copy on
/// corruption — is delegated to the engine wiring that owns the real
/// filesystem layout.
pub enum AccessLogStatus {
    /// `(vbucket, key)` pairs recorded in replay order.
    Present(Vec<(VBucketId, Vec<u8>)>),
    /// The log exists but failed to parse.
    Corrupt,
    /// No log file for this vBucket.
    Missing,
}

/// The engine-side collaborator warmup drives (§4.6). Everything storage
/// alone cannot answer — vBucket construction, access-log presence, and the
/// traffic-enable gate — goes through this seam, mirroring
/// `bucket_bgfetcher::PendingFetchSource`'s decoupling of the fetcher from
/// the vBucket map.
pub trait WarmupSink: Send + Sync {
    /// Constructs and registers a vBucket from its persisted state record.
    /// `unclean_shutdown` is set when stage 2 determines a failover entry
    /// must be appended (§4.6 stage 2).
    fn create_vbucket(&self, state: VBucketState, unclean_shutdown: bool);

    /// Inserts a key-and-metadata-only entry into the named vBucket's hash
    /// index (§4.6 stage 4, `KeyDump`).
    fn insert_key_meta(&self, vbucket: VBucketId, key: Vec<u8>);

    /// Inserts a fully resident item (§4.6 stages 6–8).
    fn insert_item(&self, item: Item);

    /// Reads the access log for `vbucket`, already falling back to the
    /// `.old` copy internally if the primary log is corrupt.
    fn access_log(&self, vbucket: VBucketId) -> AccessLogStatus;

    /// Whether the memory- or item-count traffic-enable threshold (§4.6
    /// "at any point ... short-circuit to Done") has been reached.
    fn traffic_threshold_reached(&self) -> bool;

    /// Flips the engine to serve client traffic (§4.6 stage 9).
    fn enable_traffic(&self);
}
