use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};

/// Source of run timestamps.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock in UTC.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Manually driven clock for tests.
///
/// Every call to [`Clock::now`] returns the current reading and then moves it
/// forward by the configured step (zero by default).
#[derive(Debug)]
pub struct FakeClock {
    now: Mutex<OffsetDateTime>,
    step: Duration,
}

impl FakeClock {
    /// Clock frozen at `start`.
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
            step: Duration::ZERO,
        }
    }

    /// Advances automatically by `step` after each reading.
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Jumps to `instant`.
    pub fn set(&self, instant: OffsetDateTime) {
        *self.now.lock() = instant;
    }

    /// Moves forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now += delta;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(OffsetDateTime::UNIX_EPOCH)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> OffsetDateTime {
        let mut now = self.now.lock();
        let reading = *now;
        *now += self.step;
        reading
    }
}
