//! Client timing and lookup configuration.

use std::time::Duration;

use protocol::SERVICE_WINDOW_CLASS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_POLL_INTERVAL_MS: u64 = 75;
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 30_000;

/// A configuration value the client cannot run with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("poll_interval_ms must be greater than zero")]
    ZeroPollInterval,

    #[error("query_timeout_ms ({timeout_ms}) must not be shorter than poll_interval_ms ({poll_ms})")]
    TimeoutShorterThanPoll { timeout_ms: u64, poll_ms: u64 },

    #[error("service_class must not be empty")]
    EmptyServiceClass,
}

/// Timings and lookup name used by a [`crate::Client`] and its transport.
///
/// Every field has a default, so a partial TOML table deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How often a cancellable query polls its termination source while no
    /// reply is pending.
    pub poll_interval_ms: u64,

    /// Hard ceiling on how long any query waits for its reply.
    pub query_timeout_ms: u64,

    /// Window class the service's receiving endpoint is registered under.
    pub service_class: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            service_class: SERVICE_WINDOW_CLASS.to_owned(),
        }
    }
}

impl ClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.query_timeout_ms < self.poll_interval_ms {
            return Err(ConfigError::TimeoutShorterThanPoll {
                timeout_ms: self.query_timeout_ms,
                poll_ms: self.poll_interval_ms,
            });
        }
        if self.service_class.trim().is_empty() {
            return Err(ConfigError::EmptyServiceClass);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(75));
        assert_eq!(config.query_timeout(), Duration::from_secs(30));
        assert_eq!(config.service_class, "EVERYTHING_TASKBAR_NOTIFICATION");
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn invalid_timings_are_rejected() {
        let zero = ClientConfig {
            poll_interval_ms: 0,
            ..ClientConfig::default()
        };
        assert_eq!(zero.validate(), Err(ConfigError::ZeroPollInterval));

        let inverted = ClientConfig {
            poll_interval_ms: 500,
            query_timeout_ms: 100,
            ..ClientConfig::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::TimeoutShorterThanPoll { .. })
        ));

        let nameless = ClientConfig {
            service_class: "  ".to_owned(),
            ..ClientConfig::default()
        };
        assert_eq!(nameless.validate(), Err(ConfigError::EmptyServiceClass));
    }
}
