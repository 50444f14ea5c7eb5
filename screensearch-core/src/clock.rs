//! Time source abstraction.
//!
//! Components that need to reason about ordering (segment rollover, retry
//! backoff, retention cutoffs) take `Arc<dyn Clock>` rather than calling
//! `chrono::Utc::now()` directly, so tests can drive time deterministically.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// Wall-clock time, used for anything persisted or compared across runs.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Monotonic time since an arbitrary, process-local origin. Used for
    /// durations (retry backoff, segment max-duration) where wall-clock
    /// skew would be wrong.
    fn now_monotonic(&self) -> Duration;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_monotonic(&self) -> Duration {
        PROCESS_START.get_or_init(Instant::now).elapsed()
    }
}

/// A `Clock` whose `now_utc`/`now_monotonic` are set explicitly by the test
/// and never advance on their own. Used by component unit tests that assert
/// ordering (segment rollover, retry backoff, retention cutoffs) without
/// sleeping.
pub struct FakeClock {
    utc: Mutex<DateTime<Utc>>,
    monotonic: Mutex<Duration>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            utc: Mutex::new(start),
            monotonic: Mutex::new(Duration::ZERO),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.utc.lock().unwrap() += chrono::Duration::from_std(by).unwrap();
        *self.monotonic.lock().unwrap() += by;
    }

    pub fn set_utc(&self, at: DateTime<Utc>) {
        *self.utc.lock().unwrap() = at;
    }
}

impl Clock for FakeClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.utc.lock().unwrap()
    }

    fn now_monotonic(&self) -> Duration {
        *self.monotonic.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_both_axes() {
        let clock = FakeClock::new(Utc::now());
        let before = clock.now_utc();
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now_monotonic(), Duration::from_secs(5));
        assert!(clock.now_utc() > before);
    }

    #[test]
    fn system_clock_monotonic_never_goes_backwards() {
        let clock = SystemClock;
        let a = clock.now_monotonic();
        std::thread::sleep(Duration::from_millis(5));
        let b = clock.now_monotonic();
        assert!(b >= a);
    }
}
