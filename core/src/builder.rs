//! Builder API for ergonomic breaker and registry configuration

use crate::{
    breaker::{Breaker, BreakerContext},
    callbacks::Callbacks,
    classifier::{OutcomeClassifier, StatusClassifier},
    clock::{Clock, MonotonicClock},
    config::{BreakerOptions, RearmPolicy},
    errors::ConfigError,
    registry::Registry,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for a standalone breaker with fluent API
pub struct BreakerBuilder {
    host: String,
    options: BreakerOptions,
    clock: Option<Arc<dyn Clock>>,
    callbacks: Callbacks,
}

impl BreakerBuilder {
    /// Create a new builder for a breaker guarding `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            options: BreakerOptions::default(),
            clock: None,
            callbacks: Callbacks::new(),
        }
    }

    /// Replace all options at once
    pub fn options(mut self, options: BreakerOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the number of failures that opens the breaker
    pub fn max_failures(mut self, max_failures: usize) -> Self {
        self.options.max_failures = max_failures;
        self
    }

    /// Set the cool-down before a trial attempt is admitted
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.options.max_age = max_age;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.options.jitter_factor = factor;
        self
    }

    /// Set what trips do to the timer while open
    pub fn rearm(mut self, rearm: RearmPolicy) -> Self {
        self.options.rearm = rearm;
        self
    }

    /// Set custom time source
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub(crate) fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Set callback for when the breaker opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when the breaker closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when the breaker admits a trial attempt
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Validate the options and build the breaker
    pub fn build(self) -> Result<Breaker, ConfigError> {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let context = BreakerContext {
            host: self.host,
            clock,
        };

        Breaker::with_context_and_callbacks(context, self.options, self.callbacks)
    }
}

/// Builder for a registry and its aggregate listeners
pub struct RegistryBuilder {
    clock: Option<Arc<dyn Clock>>,
    classifier: Option<Arc<dyn OutcomeClassifier>>,
    callbacks: Callbacks,
    enabled: bool,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            clock: None,
            classifier: None,
            callbacks: Callbacks::new(),
            enabled: false,
        }
    }

    /// Set the time source shared by every registered breaker
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set a classifier deciding which connection outcomes trip a breaker
    ///
    /// # Examples
    ///
    /// ```rust
    /// use host_breakers::{ConnectionEvent, PredicateClassifier, Registry};
    /// use std::sync::Arc;
    ///
    /// // Only server errors and transport failures count
    /// let registry = Registry::builder()
    ///     .classifier(Arc::new(PredicateClassifier::new(|ctx| match ctx.event {
    ///         ConnectionEvent::Completed(Some(status)) => status >= 500,
    ///         ConnectionEvent::Completed(None) => false,
    ///         _ => true,
    ///     })))
    ///     .build();
    /// ```
    pub fn classifier(mut self, classifier: Arc<dyn OutcomeClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Start with interception enabled
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set callback for when any registered breaker opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when any registered breaker closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when any registered breaker admits a trial attempt
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Registry {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(StatusClassifier));

        Registry::from_parts(clock, classifier, self.callbacks, self.enabled)
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerState;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_builder_defaults() {
        let breaker = BreakerBuilder::new("test").build().unwrap();

        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.options(), &BreakerOptions::default());
    }

    #[test]
    fn test_builder_custom_config() {
        let breaker = BreakerBuilder::new("test")
            .max_failures(10)
            .max_age(Duration::from_secs(60))
            .jitter_factor(0.2)
            .rearm(RearmPolicy::EveryTrip)
            .build()
            .unwrap();

        assert_eq!(breaker.options().max_failures, 10);
        assert_eq!(breaker.options().max_age, Duration::from_secs(60));
        assert_eq!(breaker.options().rearm, RearmPolicy::EveryTrip);
    }

    #[test]
    fn test_builder_rejects_invalid_options() {
        let result = BreakerBuilder::new("test").jitter_factor(2.0).build();
        assert!(matches!(result, Err(ConfigError::InvalidJitter { .. })));
    }

    #[test]
    fn test_builder_with_callbacks() {
        let opened = Arc::new(AtomicBool::new(false));
        let opened_clone = opened.clone();

        let mut breaker = BreakerBuilder::new("test")
            .max_failures(2)
            .on_open(move |_host| {
                opened_clone.store(true, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        breaker.trip();
        breaker.trip();

        assert!(opened.load(Ordering::SeqCst));
    }

    #[test]
    fn test_registry_builder_defaults_to_disabled() {
        let registry = RegistryBuilder::new().build();
        assert!(!registry.is_enabled());

        let registry = RegistryBuilder::new().enabled(true).build();
        assert!(registry.is_enabled());
    }
}
