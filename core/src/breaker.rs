//! Per-host breaker implemented as a state machine
//!
//! ```text
//! Closed ──[failures reach max_failures]──> Open
//!   ▲                                        │
//!   │ reset()                                │ check() once max_age elapsed
//!   │                                        ▼
//!   └────────────────────────────────── HalfOpen
//!        check() or trip() again ──────────> Open
//! ```

use crate::{
    callbacks::{Callbacks, Notification, Pending},
    clock::{Clock, MonotonicClock},
    config::{BreakerOptions, RearmPolicy},
    errors::ConfigError,
};
use state_machines::state_machine;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Breaker shared between the registry and in-flight attempts
pub type SharedBreaker = Arc<Mutex<Breaker>>;

/// Public view of the breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "CLOSED",
            BreakerState::Open => "OPEN",
            BreakerState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of a breaker
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSnapshot {
    pub host: String,
    pub state: BreakerState,
    pub failures: usize,
    /// Monotonic seconds at which the open breaker admits a trial attempt
    pub tripped_at: Option<f64>,
}

/// Breaker context - shared data across all states
#[derive(Clone)]
pub struct BreakerContext {
    pub host: String,
    pub clock: Arc<dyn Clock>,
}

impl Default for BreakerContext {
    fn default() -> Self {
        Self {
            host: String::new(),
            clock: Arc::new(MonotonicClock::new()),
        }
    }
}

impl std::fmt::Debug for BreakerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerContext")
            .field("host", &self.host)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    pub tripped_at: f64,
}

state_machine! {
    name: Circuit,
    context: BreakerContext,
    dynamic: true,

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen,
    ],
    events {
        trip {
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [cooldown_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
    }
}

impl Circuit<Open> {
    /// Lazily evaluated; nothing wakes an open breaker up except a check
    fn cooldown_elapsed(&self, ctx: &BreakerContext) -> bool {
        self.state_data_open()
            .is_none_or(|data| ctx.clock.monotonic_time() >= data.tripped_at)
    }
}

/// Circuit breaker guarding a single remote host
///
/// # Example
///
/// ```rust
/// use host_breakers::{Breaker, BreakerState};
///
/// let mut breaker = Breaker::builder("api.example.com")
///     .max_failures(2)
///     .on_open(|host| println!("{host} is failing"))
///     .build()
///     .unwrap();
///
/// assert!(!breaker.check());
/// breaker.trip();
/// breaker.trip();
/// assert_eq!(breaker.state(), BreakerState::Open);
/// assert!(breaker.check());
/// ```
pub struct Breaker {
    machine: DynamicCircuit,
    context: BreakerContext,
    options: BreakerOptions,
    failures: usize,
    callbacks: Callbacks,
    notifications: Vec<Notification>,
}

impl Breaker {
    /// Create a breaker with a real monotonic clock and no callbacks
    pub fn new(host: impl Into<String>, options: BreakerOptions) -> Result<Self, ConfigError> {
        let context = BreakerContext {
            host: host.into(),
            clock: Arc::new(MonotonicClock::new()),
        };
        Self::with_context_and_callbacks(context, options, Callbacks::new())
    }

    /// Create a breaker builder for the given host
    pub fn builder(host: impl Into<String>) -> crate::builder::BreakerBuilder {
        crate::builder::BreakerBuilder::new(host)
    }

    pub(crate) fn with_context_and_callbacks(
        context: BreakerContext,
        options: BreakerOptions,
        callbacks: Callbacks,
    ) -> Result<Self, ConfigError> {
        options.validate(&context.host)?;
        let machine = DynamicCircuit::new(context.clone());

        Ok(Self {
            machine,
            context,
            options,
            failures: 0,
            callbacks,
            notifications: Vec::new(),
        })
    }

    /// Decide whether a new attempt must be rejected (`true`) or allowed (`false`)
    pub fn check(&mut self) -> bool {
        let reject = self.check_deferred();
        self.take_pending().fire();
        reject
    }

    /// Record a failed attempt
    pub fn trip(&mut self) {
        self.trip_deferred();
        self.take_pending().fire();
    }

    /// Record a fully successful attempt and close the breaker
    pub fn reset(&mut self) {
        self.reset_deferred();
        self.take_pending().fire();
    }

    /// `check` without firing listeners; see [`Breaker::take_pending`]
    pub(crate) fn check_deferred(&mut self) -> bool {
        match self.state() {
            BreakerState::Closed => false,
            BreakerState::Open => {
                if self.machine.handle(CircuitEvent::AttemptReset).is_err() {
                    return true;
                }
                debug!(
                    host = %self.context.host,
                    "breaker half-open, admitting trial attempt"
                );
                self.notifications.push(Notification::HalfOpen);
                false
            }
            BreakerState::HalfOpen => {
                // A trial attempt is already in flight.
                if self.machine.handle(CircuitEvent::Trip).is_ok() {
                    self.mark_open();
                }
                true
            }
        }
    }

    pub(crate) fn trip_deferred(&mut self) {
        self.failures = self.failures.saturating_add(1);

        match self.state() {
            BreakerState::Closed if self.failures >= self.options.max_failures => {
                if self.machine.handle(CircuitEvent::Trip).is_ok() {
                    self.mark_open();
                }
            }
            BreakerState::HalfOpen => {
                if self.machine.handle(CircuitEvent::Trip).is_ok() {
                    self.mark_open();
                }
            }
            BreakerState::Open if self.options.rearm == RearmPolicy::EveryTrip => {
                self.arm();
            }
            _ => {}
        }
    }

    pub(crate) fn reset_deferred(&mut self) {
        self.failures = 0;
        // Recreate machine in Closed state
        self.machine = DynamicCircuit::new(self.context.clone());
        info!(host = %self.context.host, "breaker closed");
        self.notifications.push(Notification::Close);
    }

    /// Hand out queued notifications; fire them once the breaker is unlocked
    pub(crate) fn take_pending(&mut self) -> Pending {
        Pending::new(
            &self.context.host,
            &self.callbacks,
            std::mem::take(&mut self.notifications),
        )
    }

    pub fn host(&self) -> &str {
        &self.context.host
    }

    pub fn state(&self) -> BreakerState {
        match self.machine.current_state() {
            "Open" => BreakerState::Open,
            "HalfOpen" => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == BreakerState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == BreakerState::Closed
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn options(&self) -> &BreakerOptions {
        &self.options
    }

    /// Monotonic seconds at which an open breaker admits a trial attempt
    pub fn tripped_at(&self) -> Option<f64> {
        self.machine.open_data().map(|d| d.tripped_at)
    }

    /// Remaining cool-down, zero unless open
    pub fn retry_in(&self) -> Duration {
        self.tripped_at()
            .map(|at| at - self.context.clock.monotonic_time())
            .filter(|remaining| *remaining > 0.0)
            .map(|remaining| Duration::try_from_secs_f64(remaining).unwrap_or(Duration::MAX))
            .unwrap_or(Duration::ZERO)
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            host: self.context.host.clone(),
            state: self.state(),
            failures: self.failures,
            tripped_at: self.tripped_at(),
        }
    }

    /// Apply Open-state bookkeeping (timer + notification)
    fn mark_open(&mut self) {
        self.arm();
        info!(
            host = %self.context.host,
            failures = self.failures,
            retry_in_ms = self.retry_in().as_millis() as u64,
            "breaker opened"
        );
        self.notifications.push(Notification::Open);
    }

    fn arm(&mut self) {
        let tripped_at = self.context.clock.monotonic_time() + self.cooldown_secs();
        if let Some(data) = self.machine.open_data_mut() {
            data.tripped_at = tripped_at;
        }
    }

    fn cooldown_secs(&self) -> f64 {
        // Validation keeps max_age within u64 milliseconds
        let max_age_ms = u64::try_from(self.options.max_age.as_millis()).unwrap_or(u64::MAX);

        // Apply jitter using chrono-machines if jitter_factor > 0
        if self.options.jitter_factor > 0.0 && max_age_ms > 0 {
            let policy = chrono_machines::Policy {
                max_attempts: 1,
                base_delay_ms: max_age_ms,
                multiplier: 1.0,
                max_delay_ms: max_age_ms,
            };
            let delay_ms = policy.calculate_delay(1, self.options.jitter_factor);
            (delay_ms as f64) / 1000.0
        } else {
            self.options.max_age.as_secs_f64()
        }
    }
}

impl std::fmt::Debug for Breaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Breaker")
            .field("host", &self.context.host)
            .field("state", &self.state())
            .field("failures", &self.failures)
            .field("tripped_at", &self.tripped_at())
            .field("options", &self.options)
            .finish()
    }
}

/// Lock a shared breaker, recovering from a poisoned mutex
pub(crate) fn lock(breaker: &SharedBreaker) -> MutexGuard<'_, Breaker> {
    breaker.lock().unwrap_or_else(|poisoned| {
        warn!("breaker mutex poisoned, recovering");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        open: AtomicUsize,
        close: AtomicUsize,
        half_open: AtomicUsize,
    }

    fn breaker_with(
        max_failures: usize,
        max_age_ms: u64,
    ) -> (Breaker, Arc<ManualClock>, Arc<Counters>) {
        let clock = Arc::new(ManualClock::new());
        let counters = Arc::new(Counters::default());
        let (open, close, half_open) = (counters.clone(), counters.clone(), counters.clone());

        let breaker = Breaker::builder("api.example.com")
            .max_failures(max_failures)
            .max_age(Duration::from_millis(max_age_ms))
            .clock(clock.clone())
            .on_open(move |_| {
                open.open.fetch_add(1, Ordering::SeqCst);
            })
            .on_close(move |_| {
                close.close.fetch_add(1, Ordering::SeqCst);
            })
            .on_half_open(move |_| {
                half_open.half_open.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        (breaker, clock, counters)
    }

    #[test]
    fn test_new_breaker_is_closed() {
        let mut breaker = Breaker::new("db", BreakerOptions::default()).unwrap();

        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.failures(), 0);
        assert_eq!(breaker.tripped_at(), None);
        assert!(!breaker.check());
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let result = Breaker::new("db", BreakerOptions::new().max_failures(0));
        assert!(matches!(result, Err(ConfigError::InvalidMaxFailures { .. })));
    }

    #[test]
    fn test_opens_exactly_once_at_threshold() {
        let (mut breaker, _clock, counters) = breaker_with(3, 1000);

        breaker.trip();
        breaker.trip();
        assert!(breaker.is_closed());

        breaker.trip();
        assert!(breaker.is_open());
        assert_eq!(counters.open.load(Ordering::SeqCst), 1);

        breaker.trip();
        breaker.trip();
        assert!(breaker.is_open());
        assert_eq!(breaker.failures(), 5);
        assert_eq!(counters.open.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_trips_while_open_do_not_rearm_by_default() {
        let (mut breaker, clock, _counters) = breaker_with(1, 1000);

        breaker.trip();
        assert_eq!(breaker.tripped_at(), Some(1.0));

        clock.advance(Duration::from_millis(500));
        breaker.trip();
        assert_eq!(breaker.tripped_at(), Some(1.0));
    }

    #[test]
    fn test_every_trip_policy_rearms() {
        let clock = Arc::new(ManualClock::new());
        let mut breaker = Breaker::builder("db")
            .max_failures(1)
            .max_age(Duration::from_millis(1000))
            .rearm(RearmPolicy::EveryTrip)
            .clock(clock.clone())
            .build()
            .unwrap();

        breaker.trip();
        clock.advance(Duration::from_millis(500));
        breaker.trip();

        assert_eq!(breaker.tripped_at(), Some(1.5));
    }

    #[test]
    fn test_cooldown_then_half_open_then_reopen() {
        let (mut breaker, clock, counters) = breaker_with(3, 1000);

        breaker.trip();
        breaker.trip();
        breaker.trip();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(counters.open.load(Ordering::SeqCst), 1);

        assert!(breaker.check(), "still cooling down");

        clock.advance(Duration::from_millis(999));
        assert!(breaker.check(), "strictly before tripped_at");

        clock.advance(Duration::from_millis(1));
        assert!(!breaker.check());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert_eq!(breaker.tripped_at(), None);
        assert_eq!(counters.half_open.load(Ordering::SeqCst), 1);

        assert!(breaker.check());
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(counters.open.load(Ordering::SeqCst), 2);
        assert_eq!(breaker.tripped_at(), Some(2.0));
        assert_eq!(breaker.retry_in(), Duration::from_secs(1));
    }

    #[test]
    fn test_failed_trial_reopens() {
        let (mut breaker, clock, counters) = breaker_with(2, 1000);

        breaker.trip();
        breaker.trip();
        clock.advance(Duration::from_secs(1));
        assert!(!breaker.check());

        breaker.trip();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.failures(), 3);
        assert_eq!(breaker.tripped_at(), Some(2.0));
        assert_eq!(counters.open.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reset_from_every_state() {
        let (mut breaker, clock, counters) = breaker_with(1, 1000);

        breaker.reset();
        assert!(breaker.is_closed());
        assert_eq!(counters.close.load(Ordering::SeqCst), 1);

        breaker.trip();
        assert!(breaker.is_open());
        breaker.reset();
        assert!(breaker.is_closed());
        assert_eq!(breaker.failures(), 0);
        assert_eq!(breaker.tripped_at(), None);
        assert_eq!(counters.close.load(Ordering::SeqCst), 2);

        breaker.trip();
        clock.advance(Duration::from_secs(1));
        assert!(!breaker.check());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.reset();
        assert!(breaker.is_closed());
        assert_eq!(breaker.failures(), 0);
        assert_eq!(counters.close.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_zero_max_age_admits_trial_immediately() {
        let (mut breaker, _clock, _counters) = breaker_with(1, 0);

        breaker.trip();
        assert!(breaker.is_open());
        assert!(!breaker.check());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_jitter_shortens_cooldown_within_bounds() {
        let clock = Arc::new(ManualClock::new());
        let mut breaker = Breaker::builder("db")
            .max_failures(1)
            .max_age(Duration::from_millis(1000))
            .jitter_factor(0.5)
            .clock(clock)
            .build()
            .unwrap();

        breaker.trip();
        let tripped_at = breaker.tripped_at().unwrap();
        assert!((0.5..=1.0).contains(&tripped_at), "got {tripped_at}");
    }

    #[test]
    fn test_snapshot() {
        let (mut breaker, _clock, _counters) = breaker_with(1, 1000);
        breaker.trip();

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.host, "api.example.com");
        assert_eq!(snapshot.state, BreakerState::Open);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.tripped_at, Some(1.0));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(BreakerState::HalfOpen.to_string(), "HALF_OPEN");
    }

    #[test]
    fn test_deferred_transitions_queue_until_taken() {
        let (mut breaker, clock, counters) = breaker_with(1, 1000);

        breaker.trip_deferred();
        assert!(breaker.is_open());
        assert_eq!(counters.open.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_secs(1));
        assert!(!breaker.check_deferred());
        breaker.reset_deferred();

        let pending = breaker.take_pending();
        assert_eq!(
            pending.notifications(),
            &[Notification::Open, Notification::HalfOpen, Notification::Close]
        );
        assert!(breaker.take_pending().is_empty());

        pending.fire();
        assert_eq!(counters.open.load(Ordering::SeqCst), 1);
        assert_eq!(counters.half_open.load(Ordering::SeqCst), 1);
        assert_eq!(counters.close.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_longest_cooldown_does_not_panic() {
        let (mut breaker, _clock, _counters) = breaker_with(1, u64::MAX);

        breaker.trip();
        assert!(breaker.is_open());
        assert!(breaker.check());
        assert!(breaker.retry_in() > Duration::from_secs(365 * 24 * 3600));
    }
}
