use bucket_checkpoint::CheckpointManagerConfig;
use bucket_warmup::EvictionPolicy;
use std::time::Duration;

/// Bucket-wide tunables (§1, referenced throughout `spec.md` but never
/// collected into one type there). Constructed with [`Default`] plus a
/// builder, the way the teacher's config types are assembled — this core
/// does not parse a config file itself (§1 Non-goals: config-file parsing
/// is an external-system concern, not an ambient-stack one).
#[derive(Clone, Debug)]
pub struct BucketConfig {
    pub num_vbuckets: u16,
    pub readers: usize,
    pub writers: usize,
    pub aux_io: usize,
    pub non_io: usize,
    pub checkpoint: CheckpointManagerConfig,
    pub bg_fetch_delay: Duration,
    pub mem_low_mark: u64,
    pub mem_high_mark: u64,
    pub checkpoint_remover_period: Duration,
    pub eviction_policy: EvictionPolicy,
}

impl Default for BucketConfig {
    fn default() -> Self {
        BucketConfig {
            num_vbuckets: 1024,
            readers: 4,
            writers: 4,
            aux_io: 2,
            non_io: 2,
            checkpoint: CheckpointManagerConfig::default(),
            bg_fetch_delay: Duration::from_millis(10),
            mem_low_mark: 0,
            mem_high_mark: u64::MAX,
            checkpoint_remover_period: Duration::from_secs(5),
            eviction_policy: EvictionPolicy::ValueOnly,
        }
    }
}

pub struct BucketConfigBuilder {
    config: BucketConfig,
}

impl BucketConfigBuilder {
    pub fn new() -> Self {
        BucketConfigBuilder { config: BucketConfig::default() }
    }

    pub fn num_vbuckets(mut self, n: u16) -> Self {
        self.config.num_vbuckets = n;
        self
    }

    pub fn executor_threads(mut self, readers: usize, writers: usize, aux_io: usize, non_io: usize) -> Self {
        self.config.readers = readers;
        self.config.writers = writers;
        self.config.aux_io = aux_io;
        self.config.non_io = non_io;
        self
    }

    pub fn checkpoint(mut self, checkpoint: CheckpointManagerConfig) -> Self {
        self.config.checkpoint = checkpoint;
        self
    }

    pub fn bg_fetch_delay(mut self, delay: Duration) -> Self {
        self.config.bg_fetch_delay = delay;
        self
    }

    pub fn memory_watermarks(mut self, low: u64, high: u64) -> Self {
        self.config.mem_low_mark = low;
        self.config.mem_high_mark = high;
        self
    }

    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.eviction_policy = policy;
        self
    }

    pub fn build(self) -> BucketConfig {
        self.config
    }
}

impl Default for BucketConfigBuilder {
    fn default() -> Self {
        BucketConfigBuilder::new()
    }
}
