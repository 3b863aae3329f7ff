use crate::filters::{DocumentFilter, ValueFilter};
use bucket_core::{SeqNo, VBucketId};

/// A cursor over an in-progress storage scan (§6.1 `initScanContext`/`scan`).
/// Opaque to callers beyond its construction parameters; the storage
/// implementation owns the rest of its state behind this handle.
pub struct ScanContext {
    pub vbucket: VBucketId,
    pub start_seqno: SeqNo,
    pub documents: DocumentFilter,
    pub values: ValueFilter,
    pub(crate) cursor: usize,
}

impl ScanContext {
    pub fn new(vbucket: VBucketId, start_seqno: SeqNo, documents: DocumentFilter, values: ValueFilter) -> Self {
        ScanContext { vbucket, start_seqno, documents, values, cursor: 0 }
    }
}

/// Result of one `scan()` step (§6.1): storage scans are resumable, so a
/// single call may need to be invoked again (`Again`) before it drains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    Success,
    Again,
    Failed,
}
