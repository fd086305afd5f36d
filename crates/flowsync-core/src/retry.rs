//! Per-node retry policy and exponential backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default base backoff between attempts, in milliseconds.
pub const DEFAULT_BACKOFF_MS: u64 = 1_000;

/// Default multiplier applied per additional attempt.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Retry policy read from `node.config.retry`.
///
/// `max_retries` counts retries, not attempts: a policy of `max_retries = 2`
/// allows up to 3 attempts total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: DEFAULT_BACKOFF_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Read the policy from a node's `config` object. A missing or malformed
    /// `retry` key yields the default no-retry policy.
    pub fn from_node_config(config: &serde_json::Value) -> Self {
        config
            .get("retry")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Backoff before re-enqueueing after a failed attempt.
    ///
    /// `attempt` is the 1-based ordinal of the attempt that just failed:
    /// `backoff_ms * multiplier^(attempt - 1)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let millis = self.backoff_ms as f64 * self.backoff_multiplier.powi(exponent as i32);
        Duration::from_millis(millis as u64)
    }
}
