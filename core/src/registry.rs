//! Host → breaker registry and the connection interceptor built on it

use crate::{
    breaker::{Breaker, BreakerContext, BreakerSnapshot, SharedBreaker, lock},
    builder::RegistryBuilder,
    callbacks::Callbacks,
    classifier::OutcomeClassifier,
    clock::Clock,
    config::{BreakerOptions, RegistryConfig},
    errors::{CircuitError, ConfigError},
    interceptor::{Attempt, ConnectionObserver},
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, trace, warn};

/// Process-wide collection of per-host breakers
///
/// The map lock is only held to look a breaker up or to change membership;
/// state transitions lock the individual breaker.
///
/// # Example
///
/// ```rust
/// use host_breakers::{BreakerOptions, Registry};
///
/// let registry = Registry::builder()
///     .on_open(|host| eprintln!("{host} opened"))
///     .build();
/// registry.set("api.example.com", BreakerOptions::default()).unwrap();
/// registry.enable();
///
/// let attempt = registry.connect("api.example.com:443").unwrap();
/// attempt.complete(Some(200));
/// ```
pub struct Registry {
    breakers: RwLock<HashMap<String, SharedBreaker>>,
    enabled: AtomicBool,
    callbacks: Callbacks,
    clock: Arc<dyn Clock>,
    classifier: Arc<dyn OutcomeClassifier>,
}

impl Registry {
    /// Create a disabled registry with default clock and classifier
    pub fn new() -> Self {
        RegistryBuilder::new().build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub(crate) fn from_parts(
        clock: Arc<dyn Clock>,
        classifier: Arc<dyn OutcomeClassifier>,
        callbacks: Callbacks,
        enabled: bool,
    ) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            enabled: AtomicBool::new(enabled),
            callbacks,
            clock,
            classifier,
        }
    }

    /// Register a fresh breaker for `host`, replacing any existing one
    pub fn set(&self, host: &str, options: BreakerOptions) -> Result<(), ConfigError> {
        let key = normalize_host(host).ok_or_else(|| ConfigError::InvalidHost(host.to_string()))?;

        let context = BreakerContext {
            host: key.clone(),
            clock: self.clock.clone(),
        };
        let breaker =
            Breaker::with_context_and_callbacks(context, options, self.callbacks.clone())?;

        let replaced = self
            .write()
            .insert(key.clone(), Arc::new(Mutex::new(breaker)))
            .is_some();
        info!(host = %key, replaced, "breaker registered");
        Ok(())
    }

    /// Register every host of a configuration table
    ///
    /// Nothing is registered unless every entry is valid.
    pub fn apply_config(&self, config: &RegistryConfig) -> Result<(), ConfigError> {
        for (host, options) in &config.hosts {
            if normalize_host(host).is_none() {
                return Err(ConfigError::InvalidHost(host.clone()));
            }
            options.validate(host)?;
        }

        for (host, options) in &config.hosts {
            self.set(host, options.clone())?;
        }
        Ok(())
    }

    /// Deregister the breaker for `host`
    pub fn remove(&self, host: &str) -> bool {
        let Some(key) = normalize_host(host) else {
            return false;
        };

        let removed = self.write().remove(&key).is_some();
        if removed {
            info!(host = %key, "breaker removed");
        }
        removed
    }

    /// Start intercepting new connections
    pub fn enable(&self) {
        if !self.enabled.swap(true, Ordering::AcqRel) {
            debug!("connection interception enabled");
        }
    }

    /// Stop intercepting new connections; in-flight attempts keep reporting
    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::AcqRel) {
            debug!("connection interception disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Observe a new outbound connection to `target` (`host` or `host:port`)
    ///
    /// Fails only when the host's breaker rejects the attempt.
    pub fn connect(&self, target: &str) -> Result<Attempt, CircuitError> {
        if !self.is_enabled() {
            return Ok(Attempt::untracked());
        }

        let Some(host) = normalize_host(target) else {
            trace!(
                connection_target = target,
                "cannot attribute connection to a host, not intercepting"
            );
            return Ok(Attempt::untracked());
        };

        let Some(breaker) = self.read().get(&host).cloned() else {
            return Ok(Attempt::untracked());
        };

        let (reject, retry_in, pending) = {
            let mut guard = lock(&breaker);
            let reject = guard.check_deferred();
            (reject, guard.retry_in(), guard.take_pending())
        };
        pending.fire();

        if reject {
            debug!(
                host = %host,
                retry_in_ms = retry_in.as_millis() as u64,
                "connection rejected, circuit open"
            );
            return Err(CircuitError::Open { host, retry_in });
        }

        Ok(Attempt::tracked(
            host,
            breaker,
            self.classifier.clone(),
            self.clock.clone(),
        ))
    }

    /// Snapshot of the breaker registered for `host`
    pub fn get(&self, host: &str) -> Option<BreakerSnapshot> {
        let key = normalize_host(host)?;
        let breaker = self.read().get(&key).cloned()?;
        let snapshot = lock(&breaker).snapshot();
        Some(snapshot)
    }

    /// Registered hosts, sorted
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.read().keys().cloned().collect();
        hosts.sort();
        hosts
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SharedBreaker>> {
        self.breakers.read().unwrap_or_else(|poisoned| {
            warn!("registry lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SharedBreaker>> {
        self.breakers.write().unwrap_or_else(|poisoned| {
            warn!("registry lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionObserver for Registry {
    fn on_connect(&self, host: &str) -> Result<Attempt, CircuitError> {
        self.connect(host)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("hosts", &self.hosts())
            .field("enabled", &self.is_enabled())
            .field("callbacks", &self.callbacks)
            .field("classifier", &self.classifier)
            .finish()
    }
}

/// Reduce a connection target to the key breakers are registered under
///
/// Lowercases, drops a trailing dot, a `:port` suffix and IPv6 brackets.
/// Returns `None` for targets that cannot name a host.
pub fn normalize_host(target: &str) -> Option<String> {
    let target = target.trim();

    let host = if let Some(rest) = target.strip_prefix('[') {
        let (inner, tail) = rest.split_once(']')?;
        if !tail.is_empty() && !is_port_suffix(tail) {
            return None;
        }
        inner
    } else {
        match target.matches(':').count() {
            0 => target,
            1 => {
                let (host, port) = target.split_once(':')?;
                port.parse::<u16>().ok()?;
                host
            }
            // Bare IPv6 literal
            _ => target,
        }
    };

    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() || host.chars().any(|c| c.is_whitespace() || c == '/' || c == '@') {
        return None;
    }

    Some(host.to_ascii_lowercase())
}

fn is_port_suffix(tail: &str) -> bool {
    tail.strip_prefix(':')
        .is_some_and(|port| port.parse::<u16>().is_ok())
}
