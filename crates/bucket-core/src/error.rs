/// The error taxonomy of §7. `Success` is represented as `Ok` rather than as
/// a variant of this enum — idiomatic Rust threads the happy path through
/// `Result`, not a sentinel.
///
/// A handful of variants are internal-only (`Retry`, `HandleBusy`,
/// `CompactionConflict`): callers across the public engine boundary never
/// see them, they are mapped away before a request completes (§7
/// "Propagation policy").
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("key already exists")]
    KeyExists,

    #[error("key does not exist")]
    KeyMissing,

    #[error("vbucket is not owned by this node")]
    NotMyVBucket,

    #[error("temporary failure, retry the request")]
    TmpFail,

    #[error("out of memory")]
    OutOfMemory,

    #[error("operation scheduled asynchronously, completion is pending")]
    WouldBlock,

    #[error("client disconnected")]
    Disconnect,

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("rollback to seqno {0} requested by replication")]
    RollbackRequested(u64),

    #[error("rollback required but exceeds the safety threshold, full resync needed")]
    RollbackRequired,

    /// Internal only: surfaced to the caller as `TmpFail` (§7).
    #[error("internal: retry")]
    Retry,

    /// Internal only: surfaced to the caller as `TmpFail` (§7).
    #[error("internal: handle busy")]
    HandleBusy,

    /// Internal only: surfaced to the caller as `TmpFail` (§7).
    #[error("internal: compaction conflict")]
    CompactionConflict,
}

impl Error {
    /// Maps an internal-only variant to the externally-retriable status a
    /// caller at the request boundary is allowed to observe (§7).
    pub fn externalize(self) -> Error {
        match self {
            Error::Retry | Error::HandleBusy | Error::CompactionConflict => Error::TmpFail,
            other => other,
        }
    }

    /// True for variants that represent a storage-layer failure the caller
    /// may retry (§7 "Storage errors map as").
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::TmpFail | Error::OutOfMemory)
    }
}

/// Classifies the storage-layer status the core receives from
/// `bucket_storage::KvStore` (§6.1) before it is mapped into [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageStatus {
    Success,
    NoSuchFile,
    NoHeader,
    AllocFail,
    DocNotFound,
    Other,
}

impl From<StorageStatus> for Error {
    fn from(status: StorageStatus) -> Self {
        match status {
            StorageStatus::Success => {
                unreachable!("Success must not be converted to Error, use Ok(())")
            }
            StorageStatus::NoSuchFile | StorageStatus::NoHeader => Error::TmpFail,
            StorageStatus::AllocFail => Error::OutOfMemory,
            StorageStatus::DocNotFound => Error::KeyMissing,
            StorageStatus::Other => {
                tracing::warn!("unmapped storage status, defaulting to TmpFail");
                Error::TmpFail
            }
        }
    }
}
