//! Time sources for breaker cool-down tracking
//!
//! This module provides different clock implementations:
//! - `MonotonicClock`: real monotonic time anchored at creation
//! - `ManualClock`: externally driven time for tests and simulations

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Abstract monotonic time source
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Get monotonic time in seconds (relative to clock creation)
    fn monotonic_time(&self) -> f64;
}

/// Monotonic clock backed by `Instant` (immune to NTP clock skew)
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start_time: Instant,
}

impl MonotonicClock {
    /// Create a new clock anchored at the current instant
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn monotonic_time(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

/// Clock that only moves when told to
///
/// # Example
///
/// ```rust
/// use host_breakers::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// clock.advance(Duration::from_millis(1500));
/// assert_eq!(clock.monotonic_time(), 1.5);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Jump to an absolute offset from zero
    pub fn set(&self, at: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = at;
    }
}

impl Clock for ManualClock {
    fn monotonic_time(&self) -> f64 {
        self.now
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();

        let time1 = clock.monotonic_time();
        std::thread::sleep(Duration::from_millis(10));
        let time2 = clock.monotonic_time();

        assert!(time2 > time1);
    }

    #[test]
    fn test_manual_clock_starts_at_zero() {
        let clock = ManualClock::new();
        assert_eq!(clock.monotonic_time(), 0.0);
    }

    #[test]
    fn test_manual_clock_advance_and_set() {
        let clock = ManualClock::new();

        clock.advance(Duration::from_millis(250));
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.monotonic_time(), 0.5);

        clock.set(Duration::from_secs(10));
        assert_eq!(clock.monotonic_time(), 10.0);
    }
}
