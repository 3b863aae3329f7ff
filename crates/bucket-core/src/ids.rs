use std::fmt;

/// Identifies one of the fixed set of vBuckets a bucket is partitioned into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VBucketId(pub u16);

impl fmt::Display for VBucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vb:{}", self.0)
    }
}

impl From<u16> for VBucketId {
    fn from(id: u16) -> Self {
        VBucketId(id)
    }
}

/// Monotonic version counter assigned to an item on mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cas(pub u64);

impl Cas {
    pub const NONE: Cas = Cas(0);
}

/// The sequence number assigned to a mutation at queue time (`bySeqno`).
///
/// Strictly increasing per vBucket; see the vBucket invariant in §3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNo(pub u64);

impl SeqNo {
    pub const ZERO: SeqNo = SeqNo(0);

    pub fn next(self) -> SeqNo {
        SeqNo(self.0 + 1)
    }
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
