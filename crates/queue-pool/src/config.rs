//! Pool configuration.

use crate::error::ConfigurationError;
use crate::server::{QueueName, ServerId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Prefix of environment variables read by [`PoolConfig::load`]
pub const ENV_PREFIX: &str = "QUEUE_POOL";

/// Configuration supplied at pool construction. Immutable afterwards.
///
/// # Default Configuration
///
/// - Handles per server: 1
/// - Recovery interval: 60 seconds
/// - Lease poll interval: 100 milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Servers to provision, in order
    pub servers: Vec<ServerId>,

    /// Queue opened for the receive pool
    pub receive_queue: QueueName,

    /// Queue opened for the send pool
    pub send_queue: QueueName,

    /// Receive handles and send handles opened per server
    #[serde(default = "default_handles_per_server")]
    pub handles_per_server: usize,

    /// Period of the recovery job
    #[serde(default = "default_recovery_interval_seconds")]
    pub recovery_interval_seconds: u64,

    /// How often a waiting lease re-checks its pool
    #[serde(default = "default_lease_poll_interval_ms")]
    pub lease_poll_interval_ms: u64,
}

fn default_handles_per_server() -> usize {
    1
}

fn default_recovery_interval_seconds() -> u64 {
    60
}

fn default_lease_poll_interval_ms() -> u64 {
    100
}

const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MILLI: u128 = 1_000_000;

/// Whole `unit_nanos` units needed to cover `interval`, saturating at `u64::MAX`
fn ceil_units(interval: Duration, unit_nanos: u128) -> u64 {
    u64::try_from(interval.as_nanos().div_ceil(unit_nanos)).unwrap_or(u64::MAX)
}

impl PoolConfig {
    /// Create configuration with default timing
    pub fn new(
        servers: Vec<ServerId>,
        receive_queue: QueueName,
        send_queue: QueueName,
        handles_per_server: usize,
    ) -> Self {
        Self {
            servers,
            receive_queue,
            send_queue,
            handles_per_server,
            recovery_interval_seconds: default_recovery_interval_seconds(),
            lease_poll_interval_ms: default_lease_poll_interval_ms(),
        }
    }

    /// Override the recovery job period, rounded up to whole seconds
    pub fn with_recovery_interval(mut self, interval: Duration) -> Self {
        self.recovery_interval_seconds = ceil_units(interval, NANOS_PER_SECOND);
        self
    }

    /// Override the lease poll interval, rounded up to whole milliseconds
    pub fn with_lease_poll_interval(mut self, interval: Duration) -> Self {
        self.lease_poll_interval_ms = ceil_units(interval, NANOS_PER_MILLI);
        self
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_seconds)
    }

    pub fn lease_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lease_poll_interval_ms)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.servers.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "servers".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if !seen.insert(server) {
                return Err(ConfigurationError::Invalid {
                    message: format!("server '{}' is listed more than once", server),
                });
            }
        }

        if self.handles_per_server == 0 {
            return Err(ConfigurationError::Invalid {
                message: "handles_per_server must be at least 1".to_string(),
            });
        }

        if self.recovery_interval_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                message: "recovery_interval_seconds must be at least 1".to_string(),
            });
        }

        if self.lease_poll_interval_ms == 0 {
            return Err(ConfigurationError::Invalid {
                message: "lease_poll_interval_ms must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Load configuration from an optional file and the environment.
    ///
    /// Sources, later ones overriding earlier ones:
    ///  1. `path`, if given (format inferred from the extension)
    ///  2. `QUEUE_POOL__*` environment variables, e.g.
    ///     `QUEUE_POOL__SERVERS=qm1(1414),qm2(1414)` or
    ///     `QUEUE_POOL__HANDLES_PER_SERVER=4`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading pool configuration from file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("servers")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        let config: PoolConfig =
            settings
                .try_deserialize()
                .map_err(|e| ConfigurationError::Parsing {
                    message: e.to_string(),
                })?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
