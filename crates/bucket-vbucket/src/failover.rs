use bucket_core::SeqNo;
use parking_lot::Mutex;

/// Opaque ordered list of `{vb_uuid, seqno}` entries (§3 "Failover table").
/// The core only stores and hands this back — conflict resolution and
/// failover-id generation are external collaborators (§1) — so entries are
/// kept as an untyped JSON array, matching the persisted side-channel shape
/// in §6.2.
#[derive(Default)]
pub struct FailoverTable {
    entries: Mutex<Vec<serde_json::Value>>,
}

impl FailoverTable {
    pub fn new() -> Self {
        FailoverTable::default()
    }

    pub fn from_json(entries: serde_json::Value) -> Self {
        let entries = match entries {
            serde_json::Value::Array(v) => v,
            _ => Vec::new(),
        };
        FailoverTable { entries: Mutex::new(entries) }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.entries.lock().clone())
    }

    /// Appends a new failover entry at `seqno` (§4.6 "on unclean shutdown,
    /// append a failover entry at snapEnd/snapStart").
    pub fn append(&self, vb_uuid: u64, seqno: SeqNo) {
        self.entries.lock().push(serde_json::json!({ "id": vb_uuid, "seq": seqno.0 }));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
