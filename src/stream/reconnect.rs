use std::time::Duration;

use crate::ws::config::{RECONNECT_JITTER_PERMILLE, ReconnectConfig, jittered};

/// Bounded supply of reconnection attempts for one outage.
#[derive(Debug, Clone)]
pub(crate) struct RetryBudget {
    remaining: u32,
    max: u32,
    minimum_delay: Duration,
}

impl RetryBudget {
    pub(crate) fn new(config: &ReconnectConfig) -> Self {
        Self {
            remaining: config.max_attempts,
            max: config.max_attempts,
            minimum_delay: config.minimum_delay,
        }
    }

    pub(crate) fn remaining(&self) -> u32 {
        self.remaining
    }

    pub(crate) fn max(&self) -> u32 {
        self.max
    }

    /// Attempts consumed during the current outage.
    pub(crate) fn used(&self) -> u32 {
        self.max.saturating_sub(self.remaining)
    }

    /// Spend one attempt. Returns `false` when nothing is left.
    pub(crate) fn take(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub(crate) fn restore(&mut self) {
        self.remaining = self.max;
    }

    /// Delay before the next attempt: the configured minimum inflated by 10%-20%.
    pub(crate) fn next_delay(&self) -> Duration {
        jittered(self.minimum_delay, &RECONNECT_JITTER_PERMILLE)
    }
}
