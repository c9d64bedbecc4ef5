//! Error types for breaker registration and connection interception

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to the transport when a connection attempt is refused
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CircuitError {
    /// Breaker for the host is open, the attempt never reached the network
    #[error("circuit for '{host}' is open (retry in {retry_in:?})")]
    Open { host: String, retry_in: Duration },
}

impl CircuitError {
    /// Host whose breaker rejected the attempt
    pub fn host(&self) -> &str {
        match self {
            CircuitError::Open { host, .. } => host,
        }
    }
}

/// Invalid breaker configuration, rejected at registration time
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max_failures for '{host}' must be at least 1")]
    InvalidMaxFailures { host: String },

    #[error("max_age for '{host}' must fit in u64 milliseconds (got {max_age:?})")]
    InvalidMaxAge { host: String, max_age: Duration },

    #[error("jitter_factor for '{host}' must be within 0.0..=1.0 (got {factor})")]
    InvalidJitter { host: String, factor: f64 },

    #[error("host '{0}' cannot be used as a breaker key")]
    InvalidHost(String),

    #[error("failed to parse breaker configuration: {0}")]
    Parse(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
