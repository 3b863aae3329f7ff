use bucket_core::{Item, Nru};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Whether a hash-table slot carries its value or only metadata (§3
/// "resident value present vs. metadata only").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Residency {
    /// Full item with value, ready to serve.
    Resident,
    /// Key and metadata known (e.g. from a `KeyDump` warmup pass or an
    /// eviction), value must be bg-fetched before serving.
    MetaOnly,
    /// A placeholder inserted for an in-flight miss; resolved by the
    /// background fetcher (§4.4 "Get (miss)").
    TempInitial,
}

pub struct HashTableEntry {
    pub item: Item,
    pub residency: Residency,
    pub nru: Nru,
}

/// Concurrent key → current-item mapping (§3 `HashTable`). Sharded
/// internally by [`DashMap`]; a single key's chain locks independently of
/// every other key, matching the source's per-bucket-chain lock.
#[derive(Default)]
pub struct HashTable {
    entries: DashMap<Vec<u8>, HashTableEntry>,
    resident_count: AtomicUsize,
}

impl HashTable {
    pub fn new() -> Self {
        HashTable::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count of entries holding a resident value, used to drive eviction
    /// and memory-pressure decisions elsewhere in the engine.
    pub fn resident_count(&self) -> usize {
        self.resident_count.load(Ordering::Relaxed)
    }

    pub fn get(&self, key: &[u8]) -> Option<Item> {
        self.entries.get(key).map(|e| e.item.clone())
    }

    pub fn residency_of(&self, key: &[u8]) -> Option<Residency> {
        self.entries.get(key).map(|e| e.residency)
    }

    /// Inserts or overwrites the live entry for `item`'s key, fully
    /// resident. Returns the previous entry, if any (§4.4 "Set / Replace").
    pub fn upsert(&self, item: Item) -> Option<HashTableEntry> {
        let key = item.key().to_vec();
        let was_resident = matches!(
            self.entries.get(&key).map(|e| e.residency),
            Some(Residency::Resident) | Some(Residency::MetaOnly)
        );
        let entry = HashTableEntry { item, residency: Residency::Resident, nru: Nru::default() };
        let previous = self.entries.insert(key, entry);
        if !was_resident {
            self.resident_count.fetch_add(1, Ordering::Relaxed);
        }
        previous
    }

    /// Inserts a placeholder for an in-flight bg-fetch miss, if one is not
    /// already present. Returns `true` if this call created the
    /// placeholder (i.e. the caller is the first waiter, so it owns
    /// enqueuing the `BgFetchItem`).
    pub fn insert_temp_initial(&self, key: &[u8], vbucket: bucket_core::VBucketId) -> bool {
        if self.entries.contains_key(key) {
            return false;
        }
        let item = bucket_core::ItemBuilder::new(vbucket, key.to_vec()).build();
        self.entries.insert(key.to_vec(), HashTableEntry { item, residency: Residency::TempInitial, nru: Nru::default() });
        true
    }

    /// Inserts a key-and-metadata-only entry (no value resident yet), if
    /// one is not already present (§4.6 stage 4, `KeyDump`). Returns
    /// `false` if an entry for this key already existed.
    pub fn insert_meta_only(&self, item: Item) -> bool {
        let key = item.key().to_vec();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, HashTableEntry { item, residency: Residency::MetaOnly, nru: Nru::default() });
        true
    }

    pub fn remove(&self, key: &[u8]) -> Option<HashTableEntry> {
        let removed = self.entries.remove(key).map(|(_, v)| v);
        if matches!(removed.as_ref().map(|e| e.residency), Some(Residency::Resident)) {
            self.resident_count.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.resident_count.store(0, Ordering::Relaxed);
    }
}
