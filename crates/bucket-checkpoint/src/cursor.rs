use crate::checkpoint::CheckpointId;

/// Named position within the checkpoint list (§3, GLOSSARY).
#[derive(Clone, Debug)]
pub struct CursorPosition {
    pub name: String,
    pub checkpoint_id: CheckpointId,
    /// Index of the slot this cursor will return next (`nextItem`).
    pub(crate) pending_index: usize,
    /// Number of items consumed since registration.
    pub offset: u64,
}

impl CursorPosition {
    pub fn new(name: impl Into<String>, checkpoint_id: CheckpointId, pending_index: usize) -> Self {
        CursorPosition { name: name.into(), checkpoint_id, pending_index, offset: 0 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    #[error("cursor {0:?} not found")]
    NotFound(String),
    #[error("checkpoint {0:?} is not available, caller must schedule a backfill from storage")]
    NotAvailable(CheckpointId),
}
