//! Deterministic clocks.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, RwLock};
use studio_core::environment::Clock;

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use studio_testing::mocks::FixedClock;
/// use studio_core::environment::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// assert_eq!(clock.now(), clock.now());
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same time, so a test can hand one clone to an engine and
/// advance the other.
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock starting at `time`
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(RwLock::new(time)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        if let Ok(mut time) = self.time.write() {
            *time += by;
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut time) = self.time.write() {
            *time = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
            .read()
            .map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
    }
}

/// Create a default fixed clock for tests at [`crate::fixtures::t0`]
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(crate::fixtures::t0())
}
