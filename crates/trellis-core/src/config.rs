//! Engine configuration
//!
//! Loaded from TOML; every section and field has a default so an empty file
//! is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TrellisError};
use crate::logging_facility::Profile;

/// Environment variable overriding `logging.profile`
pub const ENV_LOG_PROFILE: &str = "TRELLIS_LOG_PROFILE";
/// Environment variable overriding `store.history_limit`
pub const ENV_HISTORY_LIMIT: &str = "TRELLIS_HISTORY_LIMIT";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub listeners: ListenerConfig,
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub profile: Profile,
    /// Filter directive used when `RUST_LOG` is unset
    pub filter: Option<String>,
}

/// `[store]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of prior versions returned by history queries; 0 means unlimited
    pub history_limit: usize,
}

/// `[listeners]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Notify listeners even when a commit carried no visible changes
    pub notify_empty_commits: bool,
}

impl TrellisConfig {
    /// Parse a configuration from TOML text
    ///
    /// # Errors
    /// Returns `Config` if the text is not valid TOML or has mistyped fields.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a configuration file
    ///
    /// # Errors
    /// Returns `Config` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TrellisError::Config {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `TRELLIS_*` environment overrides on top of the loaded values
    ///
    /// # Errors
    /// Returns `Config` if an override holds an unparseable value.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(profile) = lookup(ENV_LOG_PROFILE) {
            self.logging.profile =
                serde_json::from_value(serde_json::Value::String(profile.to_lowercase()))
                    .map_err(|e| TrellisError::Config {
                        message: format!("{ENV_LOG_PROFILE}: {e}"),
                    })?;
        }
        if let Some(limit) = lookup(ENV_HISTORY_LIMIT) {
            self.store.history_limit = limit.parse().map_err(|e| TrellisError::Config {
                message: format!("{ENV_HISTORY_LIMIT}: {e}"),
            })?;
        }
        Ok(())
    }
}
