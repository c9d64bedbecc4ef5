//! Breaker options and file-based registry configuration

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// What a trip does to the cool-down timer once the breaker is already open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RearmPolicy {
    /// Only the trip that crosses `max_failures` arms the timer
    #[default]
    Crossing,
    /// Every trip while open pushes the timer to `now + max_age`
    EveryTrip,
}

/// Per-host breaker options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerOptions {
    /// Number of failures that opens the breaker
    pub max_failures: usize,

    /// Cool-down before an open breaker lets a trial attempt through
    #[serde(rename = "max_age_ms", with = "duration_ms")]
    pub max_age: Duration,

    /// Jitter factor for max_age (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: max_age * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,

    pub rearm: RearmPolicy,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            max_failures: 5,
            max_age: Duration::from_millis(5000),
            jitter_factor: 0.0,
            rearm: RearmPolicy::Crossing,
        }
    }
}

impl BreakerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold
    pub fn max_failures(mut self, max_failures: usize) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Set the cool-down length
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the cool-down jitter factor
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Set the rearm policy
    pub fn rearm(mut self, rearm: RearmPolicy) -> Self {
        self.rearm = rearm;
        self
    }

    /// Reject out-of-range values instead of clamping them
    pub fn validate(&self, host: &str) -> Result<(), ConfigError> {
        if self.max_failures == 0 {
            return Err(ConfigError::InvalidMaxFailures {
                host: host.to_string(),
            });
        }

        if u64::try_from(self.max_age.as_millis()).is_err() {
            return Err(ConfigError::InvalidMaxAge {
                host: host.to_string(),
                max_age: self.max_age,
            });
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidJitter {
                host: host.to_string(),
                factor: self.jitter_factor,
            });
        }

        Ok(())
    }
}

/// Host table loaded from a configuration file
///
/// ```toml
/// [hosts."api.example.com"]
/// max_failures = 3
/// max_age_ms = 1000
///
/// [hosts."10.0.0.7"]
/// rearm = "every_trip"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub hosts: BTreeMap<String, BreakerOptions>,
}

impl RegistryConfig {
    /// Parse and validate a TOML host table
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: RegistryConfig = toml::from_str(input)?;
        for (host, options) in &config.hosts {
            options.validate(host)?;
        }
        Ok(config)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
