//! Transaction configuration
//!
//! Controls the attempt ceiling, the backoff between attempts, the overall
//! transaction timeout and the durability commits are written with.

use rand::Rng;
use std::time::Duration;
use tessera_core::DurabilityLevel;

/// Configuration for transaction retry behavior
///
/// # Example
/// ```ignore
/// let config = TransactionConfig::new()
///     .with_max_attempts(5)
///     .with_base_delay_ms(1)
///     .with_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionConfig {
    /// Maximum number of attempts, including the first (minimum 1)
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds (exponential backoff)
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds
    pub max_delay_ms: u64,
    /// Add up to half the delay again at random
    pub jitter: bool,
    /// Overall budget for the whole transaction, across attempts
    pub timeout: Duration,
    /// Durability every commit is written with
    pub durability: DurabilityLevel,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1,
            max_delay_ms: 100,
            jitter: true,
            timeout: Duration::from_secs(15),
            durability: DurabilityLevel::Majority,
        }
    }
}

impl TransactionConfig {
    /// Create a TransactionConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a TransactionConfig that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Set the attempt ceiling
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set base delay for exponential backoff
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay between attempts
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the overall transaction timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the commit durability
    pub fn with_durability(mut self, durability: DurabilityLevel) -> Self {
        self.durability = durability;
        self
    }

    /// Delay before attempt `attempt + 1` (exponential backoff)
    pub(crate) fn calculate_delay(&self, attempt: u32) -> Duration {
        // 1 << 63 is the largest shift that fits
        let shift = attempt.min(63);
        let multiplier = 1u64 << shift;
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        let jitter_ms = if self.jitter && delay_ms > 1 {
            rand::thread_rng().gen_range(0..=delay_ms / 2)
        } else {
            0
        };
        Duration::from_millis(delay_ms + jitter_ms)
    }
}
