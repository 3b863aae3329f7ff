use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Time, abstracted as an injectable closure-like trait so that tests can
/// advance time deterministically (§6.3). `hrtime` is monotonic and used for
/// snooze/wake scheduling; `real_time` is wall-clock seconds used for item
/// expiry and checkpoint creation timestamps.
pub trait Clock: Send + Sync + 'static {
    /// Monotonic high-resolution counter, analogous to `hrtime()`.
    fn hrtime(&self) -> Duration;

    /// Wall-clock seconds since the epoch, analogous to `ep_real_time()`.
    fn real_time(&self) -> u32;
}

/// The production [`Clock`], backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn hrtime(&self) -> Duration {
        static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
        let start = *START.get_or_init(std::time::Instant::now);
        start.elapsed()
    }

    fn real_time(&self) -> u32 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as u32
    }
}
