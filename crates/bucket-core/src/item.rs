use crate::{Cas, SeqNo, VBucketId};
use bytes::Bytes;

/// The kind of mutation an [`Item`] represents (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Set,
    Delete,
    CheckpointStart,
    CheckpointEnd,
    Flush,
    Empty,
}

impl OperationKind {
    /// Meta items (`CheckpointStart`/`CheckpointEnd`/`Empty`) are internal
    /// bookkeeping entries a cursor crosses but that do not represent a
    /// client mutation; see the checkpoint manager's `metaKeyIndex` split
    /// in §9's open questions.
    pub fn is_meta(self) -> bool {
        matches!(self, OperationKind::CheckpointStart | OperationKind::CheckpointEnd | OperationKind::Empty)
    }
}

/// Not-recently-used counter, a small eviction hint in `[0, 3]` (§3, GLOSSARY).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Nru(u8);

impl Nru {
    pub const MAX: u8 = 3;

    pub fn new(value: u8) -> Self {
        Nru(value.min(Self::MAX))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Bumps towards "recently used" (0), saturating.
    pub fn touch(&mut self) {
        self.0 = 0;
    }

    /// Ages towards "not recently used", saturating at [`Nru::MAX`].
    pub fn age(&mut self) {
        self.0 = (self.0 + 1).min(Self::MAX);
    }
}

/// Content-type tag recorded alongside a (possibly compressed) value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Raw,
    Json,
}

/// The unit of storage (§3). Immutable once constructed — a replace produces
/// a new `Item` rather than mutating this one. Shared by reference between
/// the hash index and every checkpoint entry that references it; lifetime is
/// the longest-living holder, modeled here with `Arc` at the call sites that
/// share ownership (`bucket-vbucket`, `bucket-checkpoint`) rather than inside
/// this type itself, keeping `Item` a plain value type.
#[derive(Clone, Debug)]
pub struct Item {
    key: Bytes,
    value: Option<Bytes>,
    compressed: bool,
    content_type: ContentType,
    cas: Cas,
    revision: u64,
    flags: u32,
    expiry: Option<u32>,
    vbucket: VBucketId,
    by_seqno: SeqNo,
    operation: OperationKind,
    nru: Nru,
}

impl Item {
    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn cas(&self) -> Cas {
        self.cas
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn expiry(&self) -> Option<u32> {
        self.expiry
    }

    pub fn vbucket(&self) -> VBucketId {
        self.vbucket
    }

    pub fn by_seqno(&self) -> SeqNo {
        self.by_seqno
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn nru(&self) -> Nru {
        self.nru
    }

    pub fn is_deleted(&self) -> bool {
        self.operation == OperationKind::Delete
    }

    pub fn is_meta(&self) -> bool {
        self.operation.is_meta()
    }

    /// Assigns a `bySeqno`, the only field a queued item acquires after
    /// construction (the checkpoint manager does this exactly once, see
    /// `CheckpointManager::queue_dirty`).
    pub fn with_seqno(mut self, seqno: SeqNo) -> Item {
        self.by_seqno = seqno;
        self
    }

    /// A tombstone retains the key but drops the value payload immediately
    /// (§4.4 "Delete").
    pub fn into_tombstone(self, revision: u64, cas: Cas) -> Item {
        Item { value: None, revision, cas, operation: OperationKind::Delete, ..self }
    }

    fn meta(vbucket: VBucketId, by_seqno: SeqNo, operation: OperationKind) -> Item {
        Item {
            key: Bytes::new(),
            value: None,
            compressed: false,
            content_type: ContentType::Raw,
            cas: Cas::NONE,
            revision: 0,
            flags: 0,
            expiry: None,
            vbucket,
            by_seqno,
            operation,
            nru: Nru::default(),
        }
    }

    pub fn checkpoint_start(vbucket: VBucketId, by_seqno: SeqNo) -> Item {
        Item::meta(vbucket, by_seqno, OperationKind::CheckpointStart)
    }

    pub fn checkpoint_end(vbucket: VBucketId, by_seqno: SeqNo) -> Item {
        Item::meta(vbucket, by_seqno, OperationKind::CheckpointEnd)
    }
}

/// Builds a client-facing `Set`/`Delete` [`Item`]. The `bySeqno` is left at
/// zero and assigned later by the checkpoint manager unless the caller
/// supplies one explicitly (replica-side replay, `genSeqno = false` in §4.2).
#[derive(Clone, Debug)]
pub struct ItemBuilder {
    key: Bytes,
    value: Option<Bytes>,
    compressed: bool,
    content_type: ContentType,
    cas: Cas,
    revision: u64,
    flags: u32,
    expiry: Option<u32>,
    vbucket: VBucketId,
    by_seqno: SeqNo,
    operation: OperationKind,
}

impl ItemBuilder {
    pub fn new(vbucket: VBucketId, key: impl Into<Bytes>) -> Self {
        ItemBuilder {
            key: key.into(),
            value: None,
            compressed: false,
            content_type: ContentType::Raw,
            cas: Cas::NONE,
            revision: 1,
            flags: 0,
            expiry: None,
            vbucket,
            by_seqno: SeqNo::ZERO,
            operation: OperationKind::Set,
        }
    }

    pub fn value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn cas(mut self, cas: Cas) -> Self {
        self.cas = cas;
        self
    }

    pub fn revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn expiry(mut self, expiry: Option<u32>) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn by_seqno(mut self, by_seqno: SeqNo) -> Self {
        self.by_seqno = by_seqno;
        self
    }

    pub fn delete(mut self) -> Self {
        self.operation = OperationKind::Delete;
        self.value = None;
        self
    }

    pub fn build(self) -> Item {
        Item {
            key: self.key,
            value: self.value,
            compressed: self.compressed,
            content_type: self.content_type,
            cas: self.cas,
            revision: self.revision,
            flags: self.flags,
            expiry: self.expiry,
            vbucket: self.vbucket,
            by_seqno: self.by_seqno,
            operation: self.operation,
            nru: Nru::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_set() {
        let item = ItemBuilder::new(VBucketId(0), "a").value("1").build();
        assert_eq!(item.operation(), OperationKind::Set);
        assert_eq!(item.key().as_ref(), b"a");
        assert_eq!(item.value().unwrap().as_ref(), b"1");
    }

    #[test]
    fn delete_drops_value() {
        let item = ItemBuilder::new(VBucketId(0), "a").value("1").delete().build();
        assert!(item.is_deleted());
        assert!(item.value().is_none());
    }

    #[test]
    fn nru_ages_and_saturates() {
        let mut nru = Nru::default();
        assert_eq!(nru.get(), 0);
        nru.age();
        nru.age();
        nru.age();
        nru.age();
        assert_eq!(nru.get(), Nru::MAX);
        nru.touch();
        assert_eq!(nru.get(), 0);
    }

    #[test]
    fn with_seqno_assigns_once() {
        let item = ItemBuilder::new(VBucketId(1), "k").value("v").build();
        let queued = item.with_seqno(SeqNo(7));
        assert_eq!(queued.by_seqno(), SeqNo(7));
    }
}
