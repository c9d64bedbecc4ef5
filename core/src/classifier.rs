//! Outcome classification for observed connections
//!
//! This module decides whether the terminal event of a connection attempt
//! counts as a failure (trip) or a success (reset) for the host's breaker.

use std::time::Duration;

/// Terminal event of a single outbound connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Transport-level error (refused, reset, TLS failure...)
    Error,
    Timeout,
    /// Attempt torn down before it completed
    Abort,
    /// Attempt finished; carries the response status when there was one
    Completed(Option<u16>),
}

impl ConnectionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionEvent::Error => "error",
            ConnectionEvent::Timeout => "timeout",
            ConnectionEvent::Abort => "abort",
            ConnectionEvent::Completed(_) => "completed",
        }
    }
}

/// Context provided to outcome classifiers
#[derive(Debug)]
pub struct OutcomeContext<'a> {
    /// Host the attempt was made to
    pub host: &'a str,
    pub event: ConnectionEvent,
    /// Time between `connect` and the terminal event
    pub duration: Duration,
}

/// Trait for classifying outcomes - determines if an outcome should trip the breaker
///
/// Returning `false` resets the breaker.
///
/// # Examples
///
/// ```rust
/// use host_breakers::{ConnectionEvent, OutcomeClassifier, OutcomeContext};
///
/// #[derive(Debug)]
/// struct ServerErrorClassifier;
///
/// impl OutcomeClassifier for ServerErrorClassifier {
///     fn should_trip(&self, ctx: &OutcomeContext<'_>) -> bool {
///         // Ignore client errors (4xx)
///         !matches!(ctx.event, ConnectionEvent::Completed(Some(400..=499)) | ConnectionEvent::Completed(None))
///     }
/// }
/// ```
pub trait OutcomeClassifier: Send + Sync + std::fmt::Debug {
    fn should_trip(&self, ctx: &OutcomeContext<'_>) -> bool;
}

/// Default classifier: transport failures, 4xx and 5xx trip; everything else resets
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusClassifier;

impl OutcomeClassifier for StatusClassifier {
    fn should_trip(&self, ctx: &OutcomeContext<'_>) -> bool {
        match ctx.event {
            ConnectionEvent::Error | ConnectionEvent::Timeout | ConnectionEvent::Abort => true,
            ConnectionEvent::Completed(Some(status)) => (400..=599).contains(&status),
            // Non-request connections have no status
            ConnectionEvent::Completed(None) => false,
        }
    }
}

/// Predicate-based classifier using a closure
pub struct PredicateClassifier<F>
where
    F: Fn(&OutcomeContext<'_>) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateClassifier<F>
where
    F: Fn(&OutcomeContext<'_>) -> bool + Send + Sync,
{
    /// Create a new predicate-based classifier
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> OutcomeClassifier for PredicateClassifier<F>
where
    F: Fn(&OutcomeContext<'_>) -> bool + Send + Sync,
{
    fn should_trip(&self, ctx: &OutcomeContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

impl<F> std::fmt::Debug for PredicateClassifier<F>
where
    F: Fn(&OutcomeContext<'_>) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateClassifier")
            .field("predicate", &"<closure>")
            .finish()
    }
}
