use crate::config::ReconnectPolicy;
use std::time::Duration;

/// Attempt accounting for a [`ReconnectPolicy`].
///
/// `0 <= attempts <= max_attempts` always holds.
#[derive(Debug, Clone)]
pub(crate) struct ReconnectState {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ReconnectState {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Claims the next attempt and returns the delay before it, or `None`
    /// once the budget is spent.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.policy.delay)
    }

    /// Called when a connection reaches OPEN.
    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }
}
