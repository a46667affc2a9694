//! Scheduler configuration.

use std::time::Duration;

/// Configuration for [`Scheduler`](super::Scheduler).
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// How often the tick loop re-evaluates pending and scheduled
    /// updates.
    pub tick_interval: Duration,
    /// Maximum number of updates executing at the same time.
    pub max_concurrent_updates: usize,
}

impl Default for SchedulerConfig {
    /// Provides the stock configuration: one-minute ticks, at most five
    /// concurrent updates.
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            max_concurrent_updates: 5,
        }
    }
}
