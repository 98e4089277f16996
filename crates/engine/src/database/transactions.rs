//! Transaction retry configuration
//!
//! Contains RetryConfig for `Database::update_with_retry` and the backoff
//! it sleeps between attempts.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ============================================================================
// Retry Configuration
// ============================================================================

/// Configuration for transaction retry behavior
///
/// Only conflicts are retried. Persisted in the config file under the
/// `[retry]` section.
///
/// # Example
/// ```ignore
/// let config = RetryConfig::new().with_max_retries(5).with_max_delay_ms(200);
/// db.update_with_retry(config, |txn| Box::pin(async move { ... })).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: usize,
    /// Base delay between retries in milliseconds (exponential backoff)
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay_ms: 1,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Create a new RetryConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base delay for exponential backoff
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay between retries
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Upper bound of the sleep after failed attempt `attempt`, in ms
    ///
    /// `base_delay_ms * 2^attempt`, saturating, capped at `max_delay_ms`.
    fn ceiling_ms(&self, attempt: usize) -> u64 {
        let doublings = u32::try_from(attempt).unwrap_or(u32::MAX);
        let factor = 2u64.checked_pow(doublings).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    /// Sleep before retrying after failed attempt `attempt`
    ///
    /// Drawn uniformly from the upper half of the exponential ceiling so
    /// that conflicting writers spread out.
    pub(crate) fn backoff(&self, attempt: usize) -> Duration {
        let ceiling = Duration::from_millis(self.ceiling_ms(attempt));
        if ceiling.is_zero() {
            return ceiling;
        }
        rand::thread_rng().gen_range(ceiling / 2..=ceiling)
    }
}
