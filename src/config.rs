//! Startup configuration for a [`RateLimiter`].
//!
//! Every value is validated when the limiter is built, so a bad policy stops the
//! process at startup instead of throttling wrongly at runtime.
//!
//! ```rust
//! use ratewindow::config::LimiterConfig;
//!
//! let cfg = LimiterConfig::from_json_str(r#"{
//!     "reaper_interval_ms": 60000,
//!     "policies": {
//!         "upload": { "window_ms": 60000, "max_requests": 3, "message": "Too many uploads" }
//!     }
//! }"#).unwrap();
//! let registry = cfg.to_registry().unwrap();
//! assert_eq!(registry.get("upload").unwrap().max_requests(), 3);
//! assert!(registry.get("auth").is_some());
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::limiter::RateLimiter;
use crate::policy::{PolicyError, RateLimitPolicy, DEFAULT_DENIAL_STATUS};
use crate::reaper::{ReaperError, DEFAULT_REAPER_INTERVAL};
use crate::registry::PolicyRegistry;

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document did not parse.
    #[error("invalid rate limit config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A policy failed validation.
    #[error("policy '{name}': {source}")]
    Policy {
        /// Offending policy name.
        name: String,
        /// Validation failure.
        #[source]
        source: PolicyError,
    },
    /// The reaper settings were rejected.
    #[error(transparent)]
    Reaper(#[from] ReaperError),
}

fn default_reaper_interval_ms() -> u64 {
    u64::try_from(DEFAULT_REAPER_INTERVAL.as_millis()).unwrap_or(u64::MAX)
}

fn default_true() -> bool {
    true
}

fn default_status_code() -> u16 {
    DEFAULT_DENIAL_STATUS
}

/// One policy as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Denial message.
    pub message: String,
    /// Denial status; 429 when omitted.
    #[serde(default = "default_status_code")]
    pub status_code: u16,
}

impl PolicyConfig {
    /// Validate into a policy.
    pub fn to_policy(&self) -> Result<RateLimitPolicy, PolicyError> {
        RateLimitPolicy::new(Duration::from_millis(self.window_ms), self.max_requests, self.message.clone())?
            .with_status_code(self.status_code)
    }
}

/// Limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimiterConfig {
    /// Reaper sweep period in milliseconds.
    #[serde(default = "default_reaper_interval_ms")]
    pub reaper_interval_ms: u64,
    /// Start from the builtin policies before applying `policies`.
    #[serde(default = "default_true")]
    pub include_builtin: bool,
    /// Additional or overriding policies by name.
    #[serde(default)]
    pub policies: BTreeMap<String, PolicyConfig>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            reaper_interval_ms: default_reaper_interval_ms(),
            include_builtin: true,
            policies: BTreeMap::new(),
        }
    }
}

impl LimiterConfig {
    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reaper sweep period.
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    /// Validate every policy into a registry.
    pub fn to_registry(&self) -> Result<PolicyRegistry, ConfigError> {
        let base = if self.include_builtin { PolicyRegistry::builtin() } else { PolicyRegistry::new() };
        self.policies.iter().try_fold(base, |reg, (name, cfg)| {
            let policy = cfg
                .to_policy()
                .map_err(|source| ConfigError::Policy { name: name.clone(), source })?;
            Ok(reg.with_policy(name.clone(), policy))
        })
    }
}

impl RateLimiter {
    /// Build a limiter from validated configuration. The reaper is not started.
    pub fn from_config(config: &LimiterConfig) -> Result<Self, ConfigError> {
        let limiter = RateLimiter::builder()
            .policies(config.to_registry()?)
            .reaper_interval(config.reaper_interval())
            .build()?;
        Ok(limiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = LimiterConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, LimiterConfig::default());
        assert_eq!(cfg.reaper_interval(), Duration::from_secs(300));
        assert_eq!(cfg.to_registry().unwrap().len(), 5);
    }

    #[test]
    fn builtin_can_be_excluded() {
        let cfg = LimiterConfig::from_json_str(
            r#"{"include_builtin": false, "policies": {"x": {"window_ms": 10, "max_requests": 1, "message": "m"}}}"#,
        )
        .unwrap();
        let reg = cfg.to_registry().unwrap();
        assert_eq!(reg.names(), vec!["x"]);
        assert_eq!(reg.get("x").unwrap().status_code(), 429);
    }

    #[test]
    fn invalid_policy_names_the_offender() {
        let cfg = LimiterConfig::from_json_str(
            r#"{"policies": {"broken": {"window_ms": 0, "max_requests": 1, "message": "m"}}}"#,
        )
        .unwrap();
        match cfg.to_registry().unwrap_err() {
            ConfigError::Policy { name, source } => {
                assert_eq!(name, "broken");
                assert_eq!(source, PolicyError::InvalidWindow(Duration::ZERO));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = LimiterConfig::from_json_str(r#"{"reaper_every": 5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_reaper_interval_fails_build() {
        let cfg = LimiterConfig { reaper_interval_ms: 0, ..LimiterConfig::default() };
        let err = RateLimiter::from_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::Reaper(ReaperError::InvalidInterval)));
    }
}
