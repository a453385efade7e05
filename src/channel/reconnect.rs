// ABOUTME: Fixed-delay reconnect policy with an attempt ceiling
// ABOUTME: Tracks consecutive attempts and owns the single armed reconnect timer

use crate::config::ReconnectConfig;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Outcome of an unexpected closure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Arm a timer for attempt number `attempt`
    Retry { attempt: u32, delay: Duration },
    /// The ceiling is reached; stay closed
    Exhausted,
}

struct ArmedTimer {
    token: u64,
    handle: JoinHandle<()>,
}

/// Reconnect bookkeeping
///
/// At most one timer is armed at a time. Each timer carries a token; a timer
/// that fires after being cancelled or replaced finds its token gone and
/// does nothing.
pub(crate) struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
    next_token: u64,
    timer: Option<ArmedTimer>,
}

impl ReconnectPolicy {
    pub(crate) fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
            next_token: 0,
            timer: None,
        }
    }

    pub(crate) fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Attempts made since the last successful open
    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Decide what an unexpected closure leads to, counting the attempt
    pub(crate) fn decide(&mut self) -> Decision {
        if self.attempts >= self.config.max_attempts {
            return Decision::Exhausted;
        }

        self.attempts += 1;
        Decision::Retry {
            attempt: self.attempts,
            delay: self.config.delay(),
        }
    }

    /// Reserve the token for the next timer
    pub(crate) fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    /// Install a freshly spawned timer, cancelling any previous one
    pub(crate) fn arm(&mut self, token: u64, handle: JoinHandle<()>) {
        self.cancel();
        self.timer = Some(ArmedTimer { token, handle });
    }

    /// Abort the armed timer, if any
    pub(crate) fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    /// Claim the timer identified by `token` as it fires
    ///
    /// Returns false when that timer was cancelled or replaced in the
    /// meantime. The firing task is not aborted.
    pub(crate) fn claim(&mut self, token: u64) -> bool {
        if self.timer.as_ref().map(|timer| timer.token) != Some(token) {
            return false;
        }
        self.timer = None;
        true
    }
}

impl Drop for ReconnectPolicy {
    fn drop(&mut self) {
        self.cancel();
    }
}
