//! Poll scheduling for secondaries

use std::fmt;
use std::time::Duration;

use crate::config::RemoteConfig;

/// Decides how long to wait before each poll attempt and how long an attempt may take
pub trait PollPolicy: Send + Sync + fmt::Debug {
    /// Delay before attempt number `attempt` (0-based)
    fn delay(&self, attempt: u32) -> Duration;

    /// Per-attempt request timeout
    fn attempt_timeout(&self) -> Duration;
}

/// Same delay before every attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedInterval {
    pub interval: Duration,
    pub attempt_timeout: Duration,
}

impl FixedInterval {
    pub fn new(interval: Duration, attempt_timeout: Duration) -> Self {
        Self {
            interval,
            attempt_timeout,
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_millis(config.poll_timeout_ms),
        )
    }
}

impl Default for FixedInterval {
    fn default() -> Self {
        Self::from_config(&RemoteConfig::default())
    }
}

impl PollPolicy for FixedInterval {
    fn delay(&self, _attempt: u32) -> Duration {
        self.interval
    }

    fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }
}
