//! Request limits enforced before anything is sent
//!
//! Violations surface as `Error::InvalidArgument`; the server enforces its
//! own copy of these limits and may be stricter.

use std::time::Duration;

use crate::error::{Error, Result};

/// Maximum number of command specs in one lookup or mutation batch
pub const MAX_SPECS_PER_BATCH: usize = 16;

/// Maximum number of segments in a path
pub const MAX_PATH_DEPTH: usize = 32;

/// Maximum document key length in bytes
pub const MAX_KEY_BYTES: usize = 250;

/// Maximum encoded document size in bytes (20 MiB)
pub const MAX_DOCUMENT_BYTES: usize = 20 * 1024 * 1024;

/// Maximum document time to live (50 years)
pub const MAX_EXPIRY: Duration = Duration::from_secs(50 * 365 * 24 * 60 * 60);

/// Client-side limits
///
/// Defaults mirror the server defaults. Tests can shrink them to exercise
/// enforcement without building huge inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum specs per batch (default: 16)
    pub max_specs_per_batch: usize,
    /// Maximum key length in bytes (default: 250)
    pub max_key_bytes: usize,
    /// Maximum encoded document size (default: 20 MiB)
    pub max_document_bytes: usize,
    /// Maximum document time to live (default: 50 years)
    pub max_expiry: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_specs_per_batch: MAX_SPECS_PER_BATCH,
            max_key_bytes: MAX_KEY_BYTES,
            max_document_bytes: MAX_DOCUMENT_BYTES,
            max_expiry: MAX_EXPIRY,
        }
    }
}

impl Limits {
    /// Validate a document key
    ///
    /// Keys must be non-empty and at most `max_key_bytes` long.
    pub fn validate_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_argument("document key must not be empty"));
        }
        if key.len() > self.max_key_bytes {
            return Err(Error::invalid_argument(format!(
                "document key is {} bytes, maximum is {}",
                key.len(),
                self.max_key_bytes
            )));
        }
        Ok(())
    }

    /// Validate the number of specs in a batch
    pub fn validate_spec_count(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(Error::invalid_argument("a batch needs at least one spec"));
        }
        if count > self.max_specs_per_batch {
            return Err(Error::invalid_argument(format!(
                "batch has {} specs, maximum is {}",
                count, self.max_specs_per_batch
            )));
        }
        Ok(())
    }

    /// Validate the encoded size of a document body
    pub fn validate_document_size(&self, encoded_len: usize) -> Result<()> {
        if encoded_len > self.max_document_bytes {
            return Err(Error::invalid_argument(format!(
                "document is {} bytes, maximum is {}",
                encoded_len, self.max_document_bytes
            )));
        }
        Ok(())
    }

    /// Validate a document time to live
    pub fn validate_expiry(&self, expiry: Duration) -> Result<()> {
        if expiry > self.max_expiry {
            return Err(Error::invalid_argument(format!(
                "expiry of {}s exceeds the maximum of {}s",
                expiry.as_secs(),
                self.max_expiry.as_secs()
            )));
        }
        Ok(())
    }
}
