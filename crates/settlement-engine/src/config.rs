//! Engine Configuration

use std::time::Duration;

/// Tunables for the transfer executor's retry schedule
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum transfer attempts before a split fails terminally
    pub max_transfer_attempts: u32,

    /// First retry delay; doubles per attempt
    pub backoff_base: Duration,

    /// Retry delay ceiling
    pub backoff_cap: Duration,

    /// How often the background worker polls for due transfers
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_transfer_attempts: 10,
            backoff_base: Duration::from_secs(30),
            backoff_cap: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_transfer_attempts: env_parse("TRANSFER_MAX_ATTEMPTS")
                .unwrap_or(defaults.max_transfer_attempts),
            backoff_base: env_parse("TRANSFER_BACKOFF_BASE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.backoff_base),
            backoff_cap: env_parse("TRANSFER_BACKOFF_CAP_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.backoff_cap),
            poll_interval: env_parse("TRANSFER_POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
        }
    }

    /// Delay before attempt `attempt + 1`, exponential with a ceiling
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self
            .backoff_base
            .saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.backoff_cap)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_cap() {
        let config = EngineConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_secs(30));
        assert_eq!(config.backoff_for(2), Duration::from_secs(60));
        assert_eq!(config.backoff_for(3), Duration::from_secs(120));
        // 30s * 2^9 = 15360s, clamped to the 1h cap
        assert_eq!(config.backoff_for(10), Duration::from_secs(3600));
        assert_eq!(config.backoff_for(31), Duration::from_secs(3600));
    }
}
