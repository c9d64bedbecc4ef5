//! host-breakers - per-host circuit breakers driven by connection outcomes
//!
//! This crate provides:
//! - A per-host state machine (Closed → Open → HalfOpen) with lazy cool-down
//! - A registry mapping hosts to breakers with aggregate open/close listeners
//! - A connection observer seam the networking layer calls into, so every
//!   attempt to a tracked host is allowed, rejected, tripped or reset
//!
//! # Example
//!
//! ```rust
//! use host_breakers::{BreakerOptions, CircuitError, Registry};
//! use std::time::Duration;
//!
//! let registry = Registry::builder()
//!     .on_open(|host| println!("circuit for {} opened", host))
//!     .on_close(|host| println!("circuit for {} closed", host))
//!     .build();
//!
//! registry
//!     .set(
//!         "api.example.com",
//!         BreakerOptions::new().max_failures(2).max_age(Duration::from_secs(5)),
//!     )
//!     .unwrap();
//! registry.enable();
//!
//! // The transport reports each attempt and its outcome
//! for _ in 0..2 {
//!     let attempt = registry.connect("api.example.com:443").unwrap();
//!     attempt.complete(Some(503));
//! }
//!
//! // Further attempts fail fast without touching the network
//! match registry.connect("api.example.com:443") {
//!     Err(CircuitError::Open { host, .. }) => assert_eq!(host, "api.example.com"),
//!     Ok(_) => unreachable!(),
//! }
//! ```

pub mod breaker;
pub mod builder;
pub mod callbacks;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod errors;
pub mod interceptor;
pub mod registry;

pub use breaker::{Breaker, BreakerSnapshot, BreakerState};
pub use builder::{BreakerBuilder, RegistryBuilder};
pub use callbacks::{Callbacks, HostCallback, Notification, Pending};
pub use classifier::{
    ConnectionEvent, OutcomeClassifier, OutcomeContext, PredicateClassifier, StatusClassifier,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{BreakerOptions, RearmPolicy, RegistryConfig};
pub use errors::{CircuitError, ConfigError};
pub use interceptor::{Attempt, ConnectionObserver};
pub use registry::{Registry, normalize_host};
