/// What `queueDirty` did with an item, so the caller can update persistence
/// statistics (§4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueClassification {
    /// The key was absent from the open checkpoint's key index.
    NewItem,
    /// The key was present and every cursor had already moved past the
    /// earlier entry, so it was deduplicated in place.
    ExistingItem,
    /// The key was present but some cursor still sits at or before the
    /// earlier entry, so the new entry was appended and the old one left
    /// intact.
    PersistAgain,
}
