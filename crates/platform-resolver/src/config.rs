//! Resolver configuration.
//!
//! Timeouts, cache lifetime and the switches consumed by the built-in
//! contributors. Configuration is loaded from environment variables with
//! defaults suitable for local development.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },

    /// Configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for a [`crate::PermissionResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Per-contributor timeout in milliseconds.
    pub contributor_timeout_ms: u64,

    /// Outer deadline for collecting every contributor, in milliseconds.
    pub resolution_deadline_ms: u64,

    /// Optional lifetime of cached rule sets within a scope, in milliseconds.
    pub cache_ttl_ms: Option<u64>,

    /// Skip the default allow rules for the standard view actions.
    pub default_deny: bool,

    /// Allow `execute-sql` unless something denies it.
    pub default_allow_sql: bool,

    /// Grant the `root` actor an instance-wide allow.
    pub root_enabled: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            contributor_timeout_ms: 2_000,
            resolution_deadline_ms: 10_000,
            cache_ttl_ms: None,
            default_deny: false,
            default_allow_sql: false,
            root_enabled: false,
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|s| s != "false" && s != "0")
}

impl ResolverConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PERMISSIONS_CONTRIBUTOR_TIMEOUT_MS`: Per-contributor timeout (default: 2000)
    /// - `PERMISSIONS_RESOLUTION_DEADLINE_MS`: Outer deadline (default: 10000)
    /// - `PERMISSIONS_CACHE_TTL_MS`: Cached rule set lifetime (default: scope lifetime)
    /// - `PERMISSIONS_DEFAULT_DENY`: Disable default view allows (default: false)
    /// - `PERMISSIONS_DEFAULT_ALLOW_SQL`: Allow arbitrary SQL by default (default: false)
    /// - `PERMISSIONS_ROOT_ENABLED`: Enable the root actor (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();

        let config = Self {
            contributor_timeout_ms: env_u64("PERMISSIONS_CONTRIBUTOR_TIMEOUT_MS")
                .unwrap_or(default.contributor_timeout_ms),
            resolution_deadline_ms: env_u64("PERMISSIONS_RESOLUTION_DEADLINE_MS")
                .unwrap_or(default.resolution_deadline_ms),
            cache_ttl_ms: env_u64("PERMISSIONS_CACHE_TTL_MS").or(default.cache_ttl_ms),
            default_deny: env_flag("PERMISSIONS_DEFAULT_DENY").unwrap_or(default.default_deny),
            default_allow_sql: env_flag("PERMISSIONS_DEFAULT_ALLOW_SQL")
                .unwrap_or(default.default_allow_sql),
            root_enabled: env_flag("PERMISSIONS_ROOT_ENABLED").unwrap_or(default.root_enabled),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON document. Missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the timeouts are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.contributor_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "contributor_timeout_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.resolution_deadline_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "resolution_deadline_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.contributor_timeout_ms > self.resolution_deadline_ms {
            return Err(ConfigError::InvalidValue {
                key: "contributor_timeout_ms".to_string(),
                message: format!(
                    "must not exceed resolution_deadline_ms ({})",
                    self.resolution_deadline_ms
                ),
            });
        }
        Ok(())
    }

    /// Per-contributor timeout as a [`Duration`].
    pub fn contributor_timeout(&self) -> Duration {
        Duration::from_millis(self.contributor_timeout_ms)
    }

    /// Outer deadline as a [`Duration`].
    pub fn resolution_deadline(&self) -> Duration {
        Duration::from_millis(self.resolution_deadline_ms)
    }

    /// Cache entry lifetime, if bounded.
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResolverConfig::default();
        assert_eq!(config.contributor_timeout(), Duration::from_secs(2));
        assert_eq!(config.resolution_deadline(), Duration::from_secs(10));
        assert!(config.cache_ttl().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = ResolverConfig::from_json(r#"{"root_enabled": true, "cache_ttl_ms": 500}"#).unwrap();
        assert!(config.root_enabled);
        assert_eq!(config.cache_ttl(), Some(Duration::from_millis(500)));
        assert_eq!(config.contributor_timeout_ms, 2_000);
    }

    #[test]
    fn test_validate_rejects_bad_timeouts() {
        let zero = ResolverConfig {
            contributor_timeout_ms: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let inverted = ResolverConfig {
            contributor_timeout_ms: 5_000,
            resolution_deadline_ms: 1_000,
            ..Default::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "contributor_timeout_ms"
        ));
    }

    #[test]
    fn test_from_env_validates() {
        std::env::set_var("PERMISSIONS_CONTRIBUTOR_TIMEOUT_MS", "30000");
        std::env::set_var("PERMISSIONS_RESOLUTION_DEADLINE_MS", "1000");
        let inverted = ResolverConfig::from_env();

        std::env::set_var("PERMISSIONS_CONTRIBUTOR_TIMEOUT_MS", "250");
        let valid = ResolverConfig::from_env();

        std::env::remove_var("PERMISSIONS_CONTRIBUTOR_TIMEOUT_MS");
        std::env::remove_var("PERMISSIONS_RESOLUTION_DEADLINE_MS");

        assert!(matches!(
            inverted,
            Err(ConfigError::InvalidValue { key, .. }) if key == "contributor_timeout_ms"
        ));
        assert_eq!(valid.unwrap().contributor_timeout_ms, 250);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(ResolverConfig::from_json("not json"), Err(ConfigError::Parse(_))));
    }
}
