use bucket_core::SeqNo;

/// `[snapStart, snapEnd]`: a contiguous, self-consistent batch of mutations
/// (GLOSSARY), returned by `getAllItemsForCursor` and used to drive replica
/// state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotRange {
    pub start: SeqNo,
    pub end: SeqNo,
}
