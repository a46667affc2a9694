//! Rollout engine configuration.

use crate::error::RolloutError;
use crate::policies::RetryPolicy;

/// Configuration for [`RolloutEngine`](super::RolloutEngine).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum number of concurrent device pushes per update.
    pub max_concurrent: usize,
    /// Retry policy applied to every device push.
    pub retry: RetryPolicy,
    /// Queue capacity for each event subscription.
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    /// Provides the stock configuration:
    /// - `max_concurrent = 100`
    /// - `retry = RetryPolicy::default()` (3 attempts, 1s/30s/2.0 backoff)
    /// - `event_buffer_size = 1000`
    fn default() -> Self {
        Self {
            max_concurrent: 100,
            retry: RetryPolicy::default(),
            event_buffer_size: 1000,
        }
    }
}

impl EngineConfig {
    /// Checks the configuration invariants.
    pub fn validate(&self) -> Result<(), RolloutError> {
        if self.max_concurrent < 1 {
            return Err(RolloutError::validation("max_concurrent must be at least 1"));
        }
        if self.retry.max_attempts < 1 {
            return Err(RolloutError::validation(
                "retry.max_attempts must be at least 1",
            ));
        }
        if self.event_buffer_size < 1 {
            return Err(RolloutError::validation(
                "event_buffer_size must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let cfg = EngineConfig {
            max_concurrent: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
