//! arealink configuration
//!
//! Loaded from TOML. Every section has defaults, so an empty file (or no file)
//! is a valid configuration apart from the service endpoint, which callers
//! must supply before talking to an Area.
//!
//! ```toml
//! [service]
//! endpoint = "https://area.example.net/api"
//!
//! [renewal]
//! skew_secs = 60
//!
//! [renewal.retry]
//! max_attempts = 4
//! initial_delay_ms = 500
//! ```

use crate::effects::reliability::{BackoffStrategy, RetryPolicy};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Allowed soft timeout window for pairing calls, in seconds
pub const PAIRING_SOFT_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 10..=20;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaLinkConfig {
    /// `[service]` table
    pub service: ServiceSettings,
    /// `[storage]` table
    pub storage: StorageSettings,
    /// `[renewal]` table
    pub renewal: RenewalSettings,
    /// `[pairing]` table
    pub pairing: PairingSettings,
}

/// Area service connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Base URL of the Area API
    pub endpoint: String,
    /// Per-request timeout applied by the HTTP client
    pub request_timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            request_timeout_secs: 30,
        }
    }
}

/// Where snapshots are kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory of the filesystem text store; platform data dir when unset
    pub directory: Option<PathBuf>,
}

/// Credential renewal policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenewalSettings {
    /// Renew this long before the access token expires
    pub skew_secs: u64,
    /// Interval of the scheduled expiry check
    pub check_interval_secs: u64,
    /// Backoff for transient refresh failures
    pub retry: RetrySettings,
}

impl Default for RenewalSettings {
    fn default() -> Self {
        Self {
            skew_secs: 60,
            check_interval_secs: 30,
            retry: RetrySettings::default(),
        }
    }
}

impl RenewalSettings {
    /// Renewal lead time
    pub fn skew(&self) -> Duration {
        Duration::from_secs(self.skew_secs)
    }

    /// Scheduled check interval
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Serializable form of a `RetryPolicy`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Refresh calls before giving up, first call included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay
    pub max_delay_ms: u64,
    pub strategy: BackoffStrategy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::exponential();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            strategy: policy.strategy,
        }
    }
}

impl RetrySettings {
    /// The policy these settings describe
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            strategy: self.strategy,
        }
    }
}

/// Onboarding handshake behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingSettings {
    /// After this long a pairing call offers the user a cancel option
    pub soft_timeout_secs: u64,
}

impl Default for PairingSettings {
    fn default() -> Self {
        Self {
            soft_timeout_secs: 15,
        }
    }
}

impl PairingSettings {
    /// Soft timeout as a duration
    pub fn soft_timeout(&self) -> Duration {
        Duration::from_secs(self.soft_timeout_secs)
    }
}

impl AreaLinkConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Load from `path` when it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.renewal.skew_secs == 0 {
            return Err(ConfigError::invalid(
                "renewal.skew_secs",
                "renewal must lead expiry by at least one second",
            ));
        }
        if self.renewal.check_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "renewal.check_interval_secs",
                "must be positive",
            ));
        }
        if self.renewal.retry.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "renewal.retry.max_attempts",
                "at least one attempt is required",
            ));
        }
        if self.renewal.retry.initial_delay_ms > self.renewal.retry.max_delay_ms {
            return Err(ConfigError::invalid(
                "renewal.retry.initial_delay_ms",
                format!(
                    "{} exceeds max_delay_ms {}",
                    self.renewal.retry.initial_delay_ms, self.renewal.retry.max_delay_ms
                ),
            ));
        }
        if !PAIRING_SOFT_TIMEOUT_RANGE.contains(&self.pairing.soft_timeout_secs) {
            return Err(ConfigError::invalid(
                "pairing.soft_timeout_secs",
                format!(
                    "{} is outside {}..={}",
                    self.pairing.soft_timeout_secs,
                    PAIRING_SOFT_TIMEOUT_RANGE.start(),
                    PAIRING_SOFT_TIMEOUT_RANGE.end()
                ),
            ));
        }
        if self.service.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "service.request_timeout_secs",
                "must be positive",
            ));
        }
        Ok(())
    }

    /// Validate and additionally require a service endpoint
    pub fn validate_for_service(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.service.endpoint.trim().is_empty() {
            return Err(ConfigError::invalid("service.endpoint", "endpoint is required"));
        }
        Ok(())
    }
}
