use bucket_core::Clock;
use parking_lot::Mutex;
use std::time::Duration;

/// A [`Clock`] tests can step deterministically, standing in for the real
/// `hrtime()`/`ep_real_time()` pair (§6.3). Starts at zero; nothing advances
/// it implicitly.
#[derive(Default)]
pub struct FixedClock {
    hrtime: Mutex<Duration>,
    real_time: Mutex<u32>,
}

impl FixedClock {
    pub fn new() -> Self {
        FixedClock::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut hrtime = self.hrtime.lock();
        *hrtime += by;
    }

    pub fn advance_real(&self, seconds: u32) {
        let mut real_time = self.real_time.lock();
        *real_time += seconds;
    }

    pub fn set_hrtime(&self, at: Duration) {
        *self.hrtime.lock() = at;
    }
}

impl Clock for FixedClock {
    fn hrtime(&self) -> Duration {
        *self.hrtime.lock()
    }

    fn real_time(&self) -> u32 {
        *self.real_time.lock()
    }
}
