use crate::checkpoint::{Checkpoint, CheckpointId, CheckpointState};
use crate::classification::QueueClassification;
use crate::cursor::{CursorError, CursorPosition};
use crate::snapshot::SnapshotRange;
use bucket_core::{Clock, Item, SeqNo, VBucketId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// The distinguished cursor name reserved by the core for the flush path
/// (§4.2).
pub const PERSISTENCE_CURSOR: &str = "persistence";

#[derive(Clone, Copy, Debug)]
pub struct CheckpointManagerConfig {
    pub max_items: usize,
    pub period: Duration,
}

impl Default for CheckpointManagerConfig {
    fn default() -> Self {
        CheckpointManagerConfig { max_items: 500, period: Duration::from_secs(5) }
    }
}

/// Where a cursor should be registered (§4.2 `registerCursor`).
#[derive(Clone, Copy, Debug)]
pub enum CursorTarget {
    ByCheckpointId(CheckpointId),
    BySeqno(SeqNo),
}

struct State {
    checkpoints: VecDeque<Checkpoint>,
    cursors: HashMap<String, CursorPosition>,
    last_by_seqno: SeqNo,
    last_closed_chk_by_seqno: SeqNo,
    num_items: usize,
    next_checkpoint_id: u64,
}

impl State {
    fn index_of(&self, id: CheckpointId) -> usize {
        self.checkpoints
            .iter()
            .position(|c| c.id == id)
            .unwrap_or_else(|| bucket_core::fatal!("cursor points at a checkpoint no longer in the list"))
    }
}

/// Maintains a per-vBucket ordered mutation log with efficient per-key
/// deduplication and cursor-based consumption (§4.2). A single mutex guards
/// all mutations, matching the source's single-lock design; everything that
/// touches the checkpoint list or cursor map goes through `self.state`.
pub struct CheckpointManager {
    vbucket: VBucketId,
    config: CheckpointManagerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl CheckpointManager {
    pub fn new(vbucket: VBucketId, config: CheckpointManagerConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.hrtime();
        let mut first = Checkpoint::new(CheckpointId(1), SeqNo::ZERO, now);
        first.append_meta_item("checkpoint_start", Item::checkpoint_start(vbucket, SeqNo::ZERO));
        let state = State {
            checkpoints: VecDeque::from([first]),
            cursors: HashMap::new(),
            last_by_seqno: SeqNo::ZERO,
            last_closed_chk_by_seqno: SeqNo::ZERO,
            num_items: 0,
            next_checkpoint_id: 2,
        };
        CheckpointManager { vbucket, config, clock, state: Mutex::new(state) }
    }

    /// Queues a mutation; assigns `bySeqno` when `gen_seqno` is set,
    /// otherwise trusts the item's own (replica replay). Returns the
    /// queued item (with its final `bySeqno`) and the dedup classification
    /// (§4.2 `queueDirty`).
    pub fn queue_dirty(&self, mut item: Item, gen_seqno: bool) -> (Item, QueueClassification) {
        debug_assert!(!item.is_meta(), "meta items are never queued through queue_dirty");
        let mut state = self.state.lock();

        let seqno = if gen_seqno {
            let next = state.last_by_seqno.next();
            state.last_by_seqno = next;
            next
        } else {
            let seqno = item.by_seqno();
            if seqno > state.last_by_seqno {
                state.last_by_seqno = seqno;
            }
            seqno
        };
        item = item.with_seqno(seqno);
        let key = item.key().to_vec();

        let open_idx = state.checkpoints.len() - 1;
        let existing = state.checkpoints[open_idx].find_key(&key);

        let classification = match existing {
            None => {
                state.checkpoints[open_idx].append_user_item(key, item.clone());
                state.num_items += 1;
                QueueClassification::NewItem
            }
            Some(old_idx) => {
                let any_read = {
                    let open = &state.checkpoints[open_idx];
                    let cursors = &state.cursors;
                    let open_id = open.id;
                    open.any_cursor_has_read(old_idx, |name| {
                        cursors.get(name).filter(|c| c.checkpoint_id == open_id).map(|c| c.pending_index)
                    })
                };
                if any_read {
                    state.checkpoints[open_idx].append_user_item(key, item.clone());
                    state.num_items += 1;
                    QueueClassification::PersistAgain
                } else {
                    state.checkpoints[open_idx].replace_user_item(old_idx, key, item.clone());
                    QueueClassification::ExistingItem
                }
            }
        };
        state.checkpoints[open_idx].snap_end = seqno;

        let should_close = {
            let open = &state.checkpoints[open_idx];
            open.item_count() >= self.config.max_items
                || self.clock.hrtime().saturating_sub(open.created_at) >= self.config.period
        };
        if should_close {
            self.close_and_open_new(&mut state);
        }

        (item, classification)
    }

    /// Closes the open checkpoint and opens a fresh one (§4.2
    /// `closeOpenCheckpoint`/`createNewCheckpoint`).
    pub fn close_open_checkpoint(&self) {
        let mut state = self.state.lock();
        self.close_and_open_new(&mut state);
    }

    fn close_and_open_new(&self, state: &mut State) {
        let boundary = state.last_by_seqno;
        let open_idx = state.checkpoints.len() - 1;
        let prev_id = state.checkpoints[open_idx].id;
        state.checkpoints[open_idx].close(Item::checkpoint_end(self.vbucket, boundary));
        state.last_closed_chk_by_seqno = boundary;

        let new_id = CheckpointId(state.next_checkpoint_id);
        state.next_checkpoint_id += 1;
        let now = self.clock.hrtime();
        let mut new_chk = Checkpoint::new(new_id, boundary, now);
        new_chk.append_meta_item("checkpoint_start", Item::checkpoint_start(self.vbucket, boundary));

        let old_len = state.checkpoints[open_idx].len();
        let to_move: Vec<String> = state
            .cursors
            .iter()
            .filter(|(_, c)| c.checkpoint_id == prev_id && c.pending_index >= old_len)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &to_move {
            state.checkpoints[open_idx].remove_cursor(name);
            new_chk.add_cursor(name);
            let cursor = state.cursors.get_mut(name).unwrap();
            cursor.checkpoint_id = new_id;
            // Skip the synthetic checkpoint_start: this cursor was already
            // caught up, it doesn't need to observe the boundary meta item.
            cursor.pending_index = 1;
        }

        state.checkpoints.push_back(new_chk);
    }

    fn force_create_checkpoint(&self, state: &mut State) {
        let boundary = state.last_by_seqno;
        let id = CheckpointId(state.next_checkpoint_id);
        state.next_checkpoint_id += 1;
        let now = self.clock.hrtime();
        let mut chk = Checkpoint::new(id, boundary, now);
        chk.append_meta_item("checkpoint_start", Item::checkpoint_start(self.vbucket, boundary));
        state.checkpoints.push_back(chk);
    }

    /// Registers or replaces a cursor. Returns the starting `bySeqno` and
    /// whether it starts exactly at a checkpoint boundary (§4.2).
    pub fn register_cursor(&self, name: &str, target: CursorTarget) -> Result<(SeqNo, bool), CursorError> {
        let mut state = self.state.lock();
        self.unlink_cursor(&mut state, name);

        match target {
            CursorTarget::ByCheckpointId(id) => {
                let Some(idx) = state.checkpoints.iter().position(|c| c.id == id) else {
                    return Err(CursorError::NotAvailable(id));
                };
                let seqno = state.checkpoints[idx].snap_start;
                state.checkpoints[idx].add_cursor(name);
                state.cursors.insert(name.to_string(), CursorPosition::new(name, id, 0));
                Ok((seqno, true))
            }
            CursorTarget::BySeqno(requested) => {
                if requested > state.last_closed_chk_by_seqno {
                    // Falls within the open checkpoint: close it first so
                    // the cursor sees a stable range (§4.2).
                    self.close_and_open_new(&mut state);
                }

                let mut found = None;
                'search: for chk_idx in 0..state.checkpoints.len() {
                    for slot_idx in 0..state.checkpoints[chk_idx].len() {
                        if let Some(it) = state.checkpoints[chk_idx].slot(slot_idx) {
                            if it.by_seqno() >= requested {
                                found = Some((chk_idx, slot_idx, it.by_seqno()));
                                break 'search;
                            }
                        }
                    }
                }

                let (chk_idx, slot_idx, seqno) = match found {
                    Some(found) => found,
                    None => {
                        let last = state.checkpoints.len() - 1;
                        let pos = state.checkpoints[last].len();
                        (last, pos, state.last_by_seqno)
                    }
                };
                let id = state.checkpoints[chk_idx].id;
                state.checkpoints[chk_idx].add_cursor(name);
                state.cursors.insert(name.to_string(), CursorPosition::new(name, id, slot_idx));
                Ok((seqno, slot_idx == 0))
            }
        }
    }

    fn unlink_cursor(&self, state: &mut State, name: &str) {
        if let Some(old) = state.cursors.remove(name) {
            let idx = state.index_of(old.checkpoint_id);
            state.checkpoints[idx].remove_cursor(name);
        }
    }

    /// Removes `name` from its checkpoint's cursor set and the cursor map
    /// (§4.2 `removeCursor`).
    pub fn remove_cursor(&self, name: &str) -> Result<(), CursorError> {
        let mut state = self.state.lock();
        if !state.cursors.contains_key(name) {
            return Err(CursorError::NotFound(name.to_string()));
        }
        self.unlink_cursor(&mut state, name);
        Ok(())
    }

    /// Advances the named cursor by one item. `None` once there is nothing
    /// past the cursor; the bool reports whether this was the last
    /// currently-available mutation (§4.2 `nextItem`).
    pub fn next_item(&self, name: &str) -> Result<Option<(Item, bool)>, CursorError> {
        let mut state = self.state.lock();
        if !state.cursors.contains_key(name) {
            return Err(CursorError::NotFound(name.to_string()));
        }
        loop {
            let (chk_id, pending) = {
                let c = &state.cursors[name];
                (c.checkpoint_id, c.pending_index)
            };
            let chk_idx = state.index_of(chk_id);

            match state.checkpoints[chk_idx].next_live_from(pending) {
                Some(slot_idx) => {
                    let item = state.checkpoints[chk_idx].slot(slot_idx).cloned().unwrap();
                    let new_pending = slot_idx + 1;
                    let is_last_in_chk = state.checkpoints[chk_idx].next_live_from(new_pending).is_none();
                    let is_last_overall = is_last_in_chk && chk_idx + 1 == state.checkpoints.len();

                    let cursor = state.cursors.get_mut(name).unwrap();
                    cursor.pending_index = new_pending;
                    cursor.offset += 1;
                    return Ok(Some((item, is_last_overall)));
                }
                None => {
                    if chk_idx + 1 >= state.checkpoints.len() {
                        return Ok(None);
                    }
                    let next_id = state.checkpoints[chk_idx + 1].id;
                    state.checkpoints[chk_idx].remove_cursor(name);
                    state.checkpoints[chk_idx + 1].add_cursor(name);
                    let cursor = state.cursors.get_mut(name).unwrap();
                    cursor.checkpoint_id = next_id;
                    cursor.pending_index = 0;
                }
            }
        }
    }

    /// Drains items from the cursor across as many complete (closed)
    /// checkpoints as are currently available, returning the snapshot range
    /// they cover (§4.2 `getAllItemsForCursor`).
    pub fn get_all_items_for_cursor(&self, name: &str, out: &mut Vec<Item>) -> Result<SnapshotRange, CursorError> {
        let start_seqno = {
            let state = self.state.lock();
            let c = state.cursors.get(name).ok_or_else(|| CursorError::NotFound(name.to_string()))?;
            let idx = state.index_of(c.checkpoint_id);
            state.checkpoints[idx].snap_start
        };
        let mut end_seqno = start_seqno;
        loop {
            let in_closed_checkpoint = {
                let state = self.state.lock();
                let c = &state.cursors[name];
                let idx = state.index_of(c.checkpoint_id);
                state.checkpoints[idx].state == CheckpointState::Closed
            };
            if !in_closed_checkpoint {
                break;
            }
            match self.next_item(name)? {
                Some((item, _)) => {
                    if item.by_seqno() > end_seqno {
                        end_seqno = item.by_seqno();
                    }
                    out.push(item);
                }
                None => break,
            }
        }
        Ok(SnapshotRange { start: start_seqno, end: end_seqno })
    }

    /// Removes every leading closed, unreferenced checkpoint. Returns the
    /// number of items purged and whether a new open checkpoint had to be
    /// forced into existence (§4.2 `removeClosedUnrefCheckpoints`).
    pub fn remove_closed_unreferenced_checkpoints(&self) -> (usize, bool) {
        let mut state = self.state.lock();
        let mut purged = 0usize;
        while state.checkpoints.len() > 1 {
            let removable = {
                let front = &state.checkpoints[0];
                front.state == CheckpointState::Closed && !front.has_cursors()
            };
            if !removable {
                break;
            }
            let removed = state.checkpoints.pop_front().unwrap();
            purged += removed.item_count();
            state.num_items = state.num_items.saturating_sub(removed.item_count());
        }
        let mut new_open_created = false;
        if state.checkpoints.is_empty() {
            self.force_create_checkpoint(&mut state);
            new_open_created = true;
        }
        (purged, new_open_created)
    }

    /// Replication cursor names ordered oldest-checkpoint-first — the
    /// order in which the cursor dropper should consider them (§4.2
    /// `getListOfCursorsToDrop`). The persistence cursor is never included
    /// (§4.5 invariant).
    pub fn list_cursors_to_drop(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut result = Vec::new();
        for chk in state.checkpoints.iter() {
            for name in chk.cursor_names() {
                if name != PERSISTENCE_CURSOR {
                    result.push(name.clone());
                }
            }
        }
        result
    }

    pub fn num_items(&self) -> usize {
        self.state.lock().num_items
    }

    pub fn last_by_seqno(&self) -> SeqNo {
        self.state.lock().last_by_seqno
    }

    pub fn checkpoint_ids(&self) -> Vec<CheckpointId> {
        self.state.lock().checkpoints.iter().map(|c| c.id).collect()
    }

    pub fn vbucket(&self) -> VBucketId {
        self.vbucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_core::ItemBuilder;
    use proptest::prelude::*;

    struct FixedClock;
    impl Clock for FixedClock {
        fn hrtime(&self) -> Duration {
            Duration::ZERO
        }
        fn real_time(&self) -> u32 {
            0
        }
    }

    fn manager(max_items: usize) -> CheckpointManager {
        let config = CheckpointManagerConfig { max_items, period: Duration::from_secs(3600) };
        CheckpointManager::new(VBucketId(0), config, Arc::new(FixedClock))
    }

    fn set(key: &str, value: &str) -> Item {
        ItemBuilder::new(VBucketId(0), key.to_string()).value(value.to_string()).build()
    }

    #[test]
    fn basic_queue_and_drain() {
        let mgr = manager(500);
        mgr.register_cursor(PERSISTENCE_CURSOR, CursorTarget::ByCheckpointId(CheckpointId(1))).unwrap();

        mgr.queue_dirty(set("a", "1"), true);
        mgr.queue_dirty(set("b", "2"), true);

        let (item, _) = mgr.next_item(PERSISTENCE_CURSOR).unwrap().unwrap();
        assert!(item.is_meta(), "first item crossed is the checkpoint_start marker");

        let (item, _) = mgr.next_item(PERSISTENCE_CURSOR).unwrap().unwrap();
        assert_eq!(item.key().as_ref(), b"a");
        let (item, is_last) = mgr.next_item(PERSISTENCE_CURSOR).unwrap().unwrap();
        assert_eq!(item.key().as_ref(), b"b");
        assert!(is_last);
        assert!(mgr.next_item(PERSISTENCE_CURSOR).unwrap().is_none());
    }

    #[test]
    fn dedup_collapses_unreferenced_key() {
        let mgr = manager(500);
        let (_, first) = mgr.queue_dirty(set("a", "1"), true);
        assert_eq!(first, QueueClassification::NewItem);
        let (_, second) = mgr.queue_dirty(set("a", "2"), true);
        assert_eq!(second, QueueClassification::ExistingItem);
        assert_eq!(mgr.num_items(), 1);
    }

    #[test]
    fn unread_cursor_does_not_block_dedup() {
        let mgr = manager(500);
        mgr.register_cursor("replica", CursorTarget::ByCheckpointId(CheckpointId(1))).unwrap();

        let (_, first) = mgr.queue_dirty(set("a", "1"), true);
        assert_eq!(first, QueueClassification::NewItem);
        // The cursor has not yet consumed the first "a", so it isn't owed
        // that value and the second write collapses in place.
        let (_, second) = mgr.queue_dirty(set("a", "2"), true);
        assert_eq!(second, QueueClassification::ExistingItem);
        assert_eq!(mgr.num_items(), 1);
    }

    #[test]
    fn cursor_that_read_first_write_blocks_dedup() {
        let mgr = manager(500);
        mgr.register_cursor(PERSISTENCE_CURSOR, CursorTarget::ByCheckpointId(CheckpointId(1))).unwrap();

        let (_, first) = mgr.queue_dirty(set("a", "1"), true);
        assert_eq!(first, QueueClassification::NewItem);
        // checkpoint_start, then "a" — the cursor has now consumed "a"'s
        // first write, so it is still owed that value and the second write
        // must not collapse into it.
        mgr.next_item(PERSISTENCE_CURSOR).unwrap();
        mgr.next_item(PERSISTENCE_CURSOR).unwrap();

        let (_, second) = mgr.queue_dirty(set("a", "2"), true);
        assert_eq!(second, QueueClassification::PersistAgain);
        assert_eq!(mgr.num_items(), 2);
    }

    #[test]
    fn checkpoint_closes_on_item_limit() {
        let mgr = manager(2);
        mgr.queue_dirty(set("a", "1"), true);
        assert_eq!(mgr.checkpoint_ids().len(), 1);
        mgr.queue_dirty(set("b", "2"), true);
        assert_eq!(mgr.checkpoint_ids().len(), 2, "hitting max_items closes the open checkpoint");
        mgr.queue_dirty(set("c", "3"), true);
        assert_eq!(mgr.checkpoint_ids().len(), 2);
    }

    #[test]
    fn remove_cursor_then_next_item_errors() {
        let mgr = manager(500);
        mgr.register_cursor("replica", CursorTarget::ByCheckpointId(CheckpointId(1))).unwrap();
        mgr.remove_cursor("replica").unwrap();
        assert!(matches!(mgr.next_item("replica"), Err(CursorError::NotFound(_))));
    }

    #[test]
    fn register_cursor_below_oldest_checkpoint_is_not_available() {
        let mgr = manager(1);
        mgr.queue_dirty(set("a", "1"), true);
        mgr.remove_closed_unreferenced_checkpoints();
        let err = mgr.register_cursor("replica", CursorTarget::ByCheckpointId(CheckpointId(1))).unwrap_err();
        assert!(matches!(err, CursorError::NotAvailable(_)));
    }

    proptest! {
        /// P1: the persistence cursor's emitted `bySeqno`s strictly increase
        /// across every non-meta item, for any sequence of queued writes.
        #[test]
        fn p1_monotonic_seqno(keys in proptest::collection::vec("[a-z]{1,4}", 1..40)) {
            let mgr = manager(500);
            mgr.register_cursor(PERSISTENCE_CURSOR, CursorTarget::ByCheckpointId(CheckpointId(1))).unwrap();
            for key in &keys {
                mgr.queue_dirty(set(key, "v"), true);
            }

            let mut last = SeqNo::ZERO;
            while let Some((item, _)) = mgr.next_item(PERSISTENCE_CURSOR).unwrap() {
                if item.is_meta() {
                    continue;
                }
                prop_assert!(item.by_seqno() > last);
                last = item.by_seqno();
            }
        }

        /// P3: after any sequence of `queue_dirty` calls with no cursor
        /// pinning the open checkpoint, at most one entry per distinct key
        /// survives in it.
        #[test]
        fn p3_dedup_bounded(keys in proptest::collection::vec("[a-z]{1,4}", 1..40)) {
            let mgr = manager(100_000);
            let distinct: std::collections::HashSet<&String> = keys.iter().collect();
            for key in &keys {
                mgr.queue_dirty(set(key, "v"), true);
            }
            prop_assert_eq!(mgr.num_items(), distinct.len());
        }
    }
}
