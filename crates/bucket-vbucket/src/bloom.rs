use dashmap::DashSet;

/// "May this key exist on disk?" filter (§3). The rebuild policy is an open
/// question (§9) the core deliberately does not resolve; it only needs to
/// accept the `{swap, clear, addToTemp}` trio used during compaction and
/// warmup. Implemented here as an exact key set rather than a probabilistic
/// filter — correct false-positive-free behavior, at a memory cost a real
/// bloom filter wouldn't pay; acceptable since this core never ships a
/// compaction implementation that would stress it.
#[derive(Default)]
pub struct BloomFilter {
    active: DashSet<Vec<u8>>,
    temp: DashSet<Vec<u8>>,
}

impl BloomFilter {
    pub fn new() -> Self {
        BloomFilter::default()
    }

    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.active.contains(key)
    }

    pub fn add(&self, key: &[u8]) {
        self.active.insert(key.to_vec());
    }

    /// Accumulates a key into the temporary filter built alongside an
    /// in-progress compaction, without affecting lookups yet.
    pub fn add_to_temp(&self, key: &[u8]) {
        self.temp.insert(key.to_vec());
    }

    /// Atomically replaces the active filter with the accumulated temp
    /// filter, the way compaction publishes its rebuilt filter.
    pub fn swap(&self) {
        self.active.clear();
        for key in self.temp.iter() {
            self.active.insert(key.clone());
        }
        self.temp.clear();
    }

    pub fn clear(&self) {
        self.active.clear();
        self.temp.clear();
    }
}
