use bucket_core::{ItemBuilder, VBucketId};
use proptest::prelude::*;

/// A short ASCII key, the shape used throughout the property tests in §8.
pub fn arb_key() -> impl Strategy<Value = Vec<u8>> {
    "[a-z]{1,16}".prop_map(|s| s.into_bytes())
}

/// A value payload of varying size, including the empty value.
pub fn arb_value() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..64)
}

pub fn arb_vbucket(num_vbuckets: u16) -> impl Strategy<Value = VBucketId> {
    (0..num_vbuckets).prop_map(VBucketId)
}

/// A `Set` item against an arbitrary vBucket, key and value, `bySeqno`
/// left at zero for the checkpoint manager to assign.
pub fn arb_set_item(num_vbuckets: u16) -> impl Strategy<Value = bucket_core::Item> {
    (arb_vbucket(num_vbuckets), arb_key(), arb_value()).prop_map(|(vbucket, key, value)| {
        ItemBuilder::new(vbucket, key).value(value).build()
    })
}
