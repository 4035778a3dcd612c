//! Reconnection policy
//!
//! Pure attempt tracker: the session actor consults it on unexpected
//! closure and owns the actual timers. Explicit `close()` never reaches
//! this policy.

use std::time::Duration;

use crate::config::ReconnectConfig;

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Record an unexpected disconnect and return the delay before the next
    /// retry, or `None` when the attempt budget is spent. Delay grows
    /// linearly: `base_delay × attempt`.
    pub fn on_unexpected_disconnect(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts > self.config.max_attempts {
            return None;
        }
        Some(self.config.base_delay * self.attempts)
    }

    /// A connection was established; the next disconnect starts over.
    pub fn on_connect_success(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts_remaining(&self) -> bool {
        self.attempts < self.config.max_attempts
    }

    /// Attempts consumed since the last successful connection.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
