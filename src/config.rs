// ABOUTME: Configuration for the resilient channel
// ABOUTME: Endpoint address plus the fixed-delay reconnect policy, loadable from the environment

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Endpoint used when nothing is configured
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:5000/ws";

/// Environment variable holding the endpoint address
pub const ENV_ENDPOINT: &str = "VIGIL_WS_URL";
/// Environment variable overriding the maximum reconnect attempts
pub const ENV_RECONNECT_ATTEMPTS: &str = "VIGIL_RECONNECT_ATTEMPTS";
/// Environment variable overriding the reconnect delay in milliseconds
pub const ENV_RECONNECT_DELAY_MS: &str = "VIGIL_RECONNECT_DELAY_MS";

/// Reconnect policy parameters
///
/// The policy is a fixed delay between attempts, bounded by an attempt
/// ceiling. There is no exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Maximum consecutive reconnect attempts before giving up
    pub max_attempts: u32,
    /// Delay before each reconnect attempt (milliseconds)
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 3000,
        }
    }
}

impl ReconnectConfig {
    /// Delay before each reconnect attempt
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Target endpoint address (e.g. `ws://host:5000/ws`)
    pub endpoint: String,
    /// Reconnect policy
    pub reconnect: ReconnectConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ChannelConfig {
    /// Build a configuration from the process environment
    ///
    /// Unset or unparsable variables fall back to the defaults; parse
    /// failures are logged.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|v| !v.trim().is_empty()) {
            config.endpoint = endpoint.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_RECONNECT_ATTEMPTS) {
            match raw.trim().parse() {
                Ok(v) => config.reconnect.max_attempts = v,
                Err(e) => log::warn!("Ignoring {}={:?}: {}", ENV_RECONNECT_ATTEMPTS, raw, e),
            }
        }

        if let Some(raw) = lookup(ENV_RECONNECT_DELAY_MS) {
            match raw.trim().parse() {
                Ok(v) => config.reconnect.delay_ms = v,
                Err(e) => log::warn!("Ignoring {}={:?}: {}", ENV_RECONNECT_DELAY_MS, raw, e),
            }
        }

        config
    }
}
