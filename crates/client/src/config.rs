//! Client configuration via `tessera.toml`
//!
//! Every field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tessera_core::{DurabilityLevel, Error, Limits, Result};

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "tessera.toml";

/// Client configuration
///
/// # Example
///
/// ```toml
/// # Per-request timeout in milliseconds
/// operation_timeout_ms = 2500
///
/// # Durability applied when a call does not request one:
/// # "none", "majority", "majority_and_persist_to_active", "persist_to_majority"
/// durability = "none"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Per-request timeout in milliseconds
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Default durability level
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Maximum specs per lookup or mutate batch
    #[serde(default = "default_max_specs")]
    pub max_specs_per_batch: usize,
    /// Maximum key length in bytes
    #[serde(default = "default_max_key_bytes")]
    pub max_key_bytes: usize,
}

fn default_operation_timeout_ms() -> u64 {
    2500
}

fn default_durability_str() -> String {
    "none".to_string()
}

fn default_max_specs() -> usize {
    tessera_core::limits::MAX_SPECS_PER_BATCH
}

fn default_max_key_bytes() -> usize {
    tessera_core::limits::MAX_KEY_BYTES
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            operation_timeout_ms: default_operation_timeout_ms(),
            durability: default_durability_str(),
            max_specs_per_batch: default_max_specs(),
            max_key_bytes: default_max_key_bytes(),
        }
    }
}

impl ClientConfig {
    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-request timeout
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the default durability level
    pub fn with_durability(mut self, level: DurabilityLevel) -> Self {
        self.durability = level.to_string();
        self
    }

    /// Per-request timeout
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Parse the durability string
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown level.
    pub fn durability_level(&self) -> Result<DurabilityLevel> {
        self.durability.parse()
    }

    /// Limits derived from this configuration
    pub fn limits(&self) -> Limits {
        Limits {
            max_specs_per_batch: self.max_specs_per_batch,
            max_key_bytes: self.max_key_bytes,
            ..Limits::default()
        }
    }

    /// Check every field
    pub fn validate(&self) -> Result<()> {
        self.durability_level()?;
        if self.operation_timeout_ms == 0 {
            return Err(Error::invalid_argument("operation_timeout_ms must be positive"));
        }
        if self.max_specs_per_batch == 0
            || self.max_specs_per_batch > tessera_core::limits::MAX_SPECS_PER_BATCH
        {
            return Err(Error::invalid_argument(format!(
                "max_specs_per_batch must be between 1 and {}",
                tessera_core::limits::MAX_SPECS_PER_BATCH
            )));
        }
        Ok(())
    }

    /// Read and parse config from a file path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Internal {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        let config: ClientConfig = toml::from_str(&content).map_err(|e| {
            Error::invalid_argument(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize this config to TOML and write it to the given path
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Internal {
            reason: format!("failed to serialize config: {}", e),
        })?;
        std::fs::write(path, content).map_err(|e| Error::Internal {
            reason: format!("failed to write config file '{}': {}", path.display(), e),
        })
    }
}
