//! Module: config
//! Responsibility: runtime tunables for allocation, backfill and leader
//! election, loaded from TOML and validated once at startup.

use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),

    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorClass::Validation, ErrorOrigin::Config, err.to_string())
    }
}

///
/// StrataConfig
///
/// Every field has a default, so an empty document is a valid config.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StrataConfig {
    /// Byte prefix under which every key of this datastore lives.
    pub root_prefix: String,

    /// Hard wall-clock limit the store enforces on one transaction.
    pub max_tx_duration_ms: u64,

    /// Headroom kept below `max_tx_duration_ms` before a backfill checkpoints.
    pub tx_safety_margin_ms: u64,

    /// Compare-and-swap attempts per allocator call.
    pub allocator_retries: usize,

    /// Counters reserved per round trip by the scattered allocator.
    pub scattered_reservation_size: u64,

    pub lock_heartbeat_ms: u64,
    pub lock_lease_ms: u64,

    /// Upper bound of the randomized builder backoff after a failure.
    pub builder_backoff_max_ms: u64,

    /// Largest serialized entity accepted by the data layer.
    pub max_entity_bytes: usize,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            root_prefix: "strata".to_string(),
            max_tx_duration_ms: 5_000,
            tx_safety_margin_ms: 1_000,
            allocator_retries: 5,
            scattered_reservation_size: 10_000,
            lock_heartbeat_ms: 1_000,
            lock_lease_ms: 10_000,
            builder_backoff_max_ms: 20_000,
            max_entity_bytes: 1_048_572,
        }
    }
}

impl StrataConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(source).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "root_prefix",
                reason: "must not be empty".to_string(),
            });
        }
        if self.tx_safety_margin_ms >= self.max_tx_duration_ms {
            return Err(ConfigError::Invalid {
                field: "tx_safety_margin_ms",
                reason: format!(
                    "must be below max_tx_duration_ms ({})",
                    self.max_tx_duration_ms
                ),
            });
        }
        if self.allocator_retries == 0 {
            return Err(ConfigError::Invalid {
                field: "allocator_retries",
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.scattered_reservation_size == 0 {
            return Err(ConfigError::Invalid {
                field: "scattered_reservation_size",
                reason: "must be positive".to_string(),
            });
        }
        if self.lock_heartbeat_ms == 0 || self.lock_lease_ms <= self.lock_heartbeat_ms {
            return Err(ConfigError::Invalid {
                field: "lock_lease_ms",
                reason: format!(
                    "must exceed a non-zero lock_heartbeat_ms ({})",
                    self.lock_heartbeat_ms
                ),
            });
        }
        if self.max_entity_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_entity_bytes",
                reason: "must be positive".to_string(),
            });
        }

        Ok(())
    }

    #[must_use]
    pub fn root_prefix_bytes(&self) -> &[u8] {
        self.root_prefix.as_bytes()
    }

    /// Time a backfill transaction may run before it must checkpoint.
    #[must_use]
    pub const fn backfill_deadline(&self) -> Duration {
        Duration::from_millis(self.max_tx_duration_ms.saturating_sub(self.tx_safety_margin_ms))
    }

    #[must_use]
    pub const fn max_tx_duration(&self) -> Duration {
        Duration::from_millis(self.max_tx_duration_ms)
    }

    #[must_use]
    pub const fn lock_heartbeat(&self) -> Duration {
        Duration::from_millis(self.lock_heartbeat_ms)
    }

    #[must_use]
    pub const fn lock_lease(&self) -> Duration {
        Duration::from_millis(self.lock_lease_ms)
    }

    #[must_use]
    pub const fn builder_backoff_max(&self) -> Duration {
        Duration::from_millis(self.builder_backoff_max_ms)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = StrataConfig::from_toml_str("").expect("empty config should parse");
        assert_eq!(config, StrataConfig::default());
        assert_eq!(config.backfill_deadline(), Duration::from_secs(4));
    }

    #[test]
    fn partial_document_overrides_named_fields() {
        let config = StrataConfig::from_toml_str(
            r#"
            root_prefix = "tenant-a"
            allocator_retries = 9
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.root_prefix_bytes(), b"tenant-a");
        assert_eq!(config.allocator_retries, 9);
        assert_eq!(config.scattered_reservation_size, 10_000);
    }

    #[test]
    fn safety_margin_must_leave_room_for_work() {
        let err = StrataConfig::from_toml_str(
            "max_tx_duration_ms = 1000\ntx_safety_margin_ms = 1000\n",
        )
        .expect_err("margin equal to the limit should be rejected");

        assert!(
            matches!(err, ConfigError::Invalid { field: "tx_safety_margin_ms", .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = StrataConfig::from_toml_str("shard_count = 4\n")
            .expect_err("unknown field should be rejected");
        assert!(matches!(err, ConfigError::Parse(_)), "unexpected error: {err:?}");

        let internal = InternalError::from(err);
        assert_eq!(internal.class, ErrorClass::Validation);
        assert_eq!(internal.origin, ErrorOrigin::Config);
    }
}
