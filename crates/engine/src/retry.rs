//! Upgrade retry configuration
//!
//! Contains RetryConfig for the bounded retry of contended upgrades.

use std::time::Duration;

// ============================================================================
// Retry Configuration
// ============================================================================

/// Configuration for upgrade retry behavior
///
/// A lost compare-and-upgrade race or a timed-out wait for the upgrade
/// section is retried with exponential backoff. Exhausting `max_retries`
/// surfaces `ContentionExhausted`; nothing here loops forever.
///
/// # Example
/// ```ignore
/// let config = RetryConfig {
///     max_retries: 5,
///     base_delay_ms: 1,
///     max_delay_ms: 50,
///     section_timeout_ms: 1_000,
/// };
/// let coordinator = coordinator.with_retry_config(config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = single attempt)
    pub max_retries: u32,
    /// Base delay between retries in milliseconds (exponential backoff)
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Longest wait for the per-database upgrade section in milliseconds
    pub section_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 8,
            base_delay_ms: 1,
            max_delay_ms: 50,
            section_timeout_ms: 2_000,
        }
    }
}

impl RetryConfig {
    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Cap the backoff between retries
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Set the upgrade section wait bound
    pub fn with_section_timeout_ms(mut self, section_timeout_ms: u64) -> Self {
        self.section_timeout_ms = section_timeout_ms;
        self
    }

    /// Total attempts allowed (first try plus retries)
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Upgrade section wait bound
    pub fn section_timeout(&self) -> Duration {
        Duration::from_millis(self.section_timeout_ms)
    }

    /// Sleep before retry number `retry` (0-based): base doubled per retry, capped
    pub(crate) fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let config = RetryConfig {
            base_delay_ms: 10,
            max_delay_ms: 100,
            ..RetryConfig::default()
        };
        assert_eq!(config.backoff(0), Duration::from_millis(10));
        assert_eq!(config.backoff(2), Duration::from_millis(40));
        assert_eq!(config.backoff(10), Duration::from_millis(100));
        assert_eq!(config.backoff(u32::MAX), Duration::from_millis(100));
    }

    #[test]
    fn test_attempts_include_first_try() {
        assert_eq!(RetryConfig::default().with_max_retries(0).max_attempts(), 1);
        assert_eq!(RetryConfig::default().max_attempts(), 9);
        assert_eq!(
            RetryConfig::default().with_max_retries(u32::MAX).max_attempts(),
            u32::MAX
        );
    }
}
