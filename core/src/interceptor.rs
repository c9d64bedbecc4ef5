//! Connection-lifecycle interception
//!
//! A transport reports every outbound connection through [`ConnectionObserver`]
//! and receives an [`Attempt`]. The attempt carries the outcome back to the
//! host's breaker: the first terminal event wins, later ones are ignored, and
//! an attempt dropped without any terminal event counts as aborted.

use crate::{
    breaker::{SharedBreaker, lock},
    classifier::{ConnectionEvent, OutcomeClassifier, OutcomeContext},
    clock::Clock,
    errors::CircuitError,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::trace;

/// Seam between a networking layer and the breakers
///
/// Implementations must never fail for reasons other than an open circuit:
/// targets they cannot attribute to a host are simply not intercepted.
pub trait ConnectionObserver: Send + Sync {
    /// Called when a connection to `host` is about to be initiated
    fn on_connect(&self, host: &str) -> Result<Attempt, CircuitError>;
}

/// Outcome observer for a single connection attempt
#[derive(Debug)]
pub struct Attempt {
    tracked: Option<Tracked>,
}

struct Tracked {
    host: String,
    breaker: SharedBreaker,
    classifier: Arc<dyn OutcomeClassifier>,
    clock: Arc<dyn Clock>,
    started_at: f64,
    settled: AtomicBool,
}

impl std::fmt::Debug for Tracked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracked")
            .field("host", &self.host)
            .field("started_at", &self.started_at)
            .field("settled", &self.settled.load(Ordering::Acquire))
            .finish()
    }
}

impl Attempt {
    /// Attempt to a host without a breaker; reports are ignored
    pub fn untracked() -> Self {
        Self { tracked: None }
    }

    pub(crate) fn tracked(
        host: String,
        breaker: SharedBreaker,
        classifier: Arc<dyn OutcomeClassifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let started_at = clock.monotonic_time();
        Self {
            tracked: Some(Tracked {
                host,
                breaker,
                classifier,
                clock,
                started_at,
                settled: AtomicBool::new(false),
            }),
        }
    }

    /// Whether a breaker observes this attempt
    pub fn is_tracked(&self) -> bool {
        self.tracked.is_some()
    }

    /// Host of the observing breaker
    pub fn host(&self) -> Option<&str> {
        self.tracked.as_ref().map(|t| t.host.as_str())
    }

    /// Whether a terminal event has already been applied
    pub fn is_settled(&self) -> bool {
        self.tracked
            .as_ref()
            .is_some_and(|t| t.settled.load(Ordering::Acquire))
    }

    /// Report the terminal event of the attempt
    ///
    /// Returns `true` only for the event that reached the breaker.
    pub fn report(&self, event: ConnectionEvent) -> bool {
        let Some(tracked) = &self.tracked else {
            return false;
        };

        if tracked.settled.swap(true, Ordering::AcqRel) {
            trace!(
                host = %tracked.host,
                event = event.as_str(),
                "ignoring event for settled attempt"
            );
            return false;
        }

        tracked.apply(event);
        true
    }

    /// Shorthand for `report(ConnectionEvent::Completed(status))`
    pub fn complete(&self, status: Option<u16>) -> bool {
        self.report(ConnectionEvent::Completed(status))
    }

    /// Shorthand for `report(ConnectionEvent::Error)`
    pub fn fail(&self) -> bool {
        self.report(ConnectionEvent::Error)
    }
}

impl Tracked {
    fn apply(&self, event: ConnectionEvent) {
        let elapsed = (self.clock.monotonic_time() - self.started_at).max(0.0);
        let ctx = OutcomeContext {
            host: &self.host,
            event,
            duration: Duration::from_secs_f64(elapsed),
        };
        let should_trip = self.classifier.should_trip(&ctx);
        let status = match event {
            ConnectionEvent::Completed(status) => status,
            _ => None,
        };

        trace!(
            host = %self.host,
            event = event.as_str(),
            status = ?status,
            should_trip,
            "connection outcome"
        );

        let pending = {
            let mut breaker = lock(&self.breaker);
            if should_trip {
                breaker.trip_deferred();
            } else {
                breaker.reset_deferred();
            }
            breaker.take_pending()
        };
        pending.fire();
    }
}

impl Drop for Attempt {
    fn drop(&mut self) {
        if self.is_tracked() && !self.is_settled() {
            self.report(ConnectionEvent::Abort);
        }
    }
}
