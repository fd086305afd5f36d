//! Engine configuration loaded from environment variables.

use std::time::Duration;

use crate::backpressure::BackpressureThresholds;

/// Engine tuning knobs.
///
/// All fields have defaults suitable for local development; in production,
/// override via environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard cap on concurrently running jobs across all executions.
    pub max_concurrency: usize,
    /// Worker idle poll interval (fallback when no enqueue notification).
    pub poll_interval: Duration,
    /// Queue-depth admission thresholds.
    pub backpressure: BackpressureThresholds,
    /// Idempotency key lifetime.
    pub idempotency_ttl: Duration,
    /// How often expired idempotency keys are swept.
    pub idempotency_sweep_interval: Duration,
    /// A job is reported stalled after this long without a heartbeat.
    pub heartbeat_stall: Duration,
    /// Deadline for a single `execute_workflow` call.
    pub orchestrator_timeout: Duration,
    /// Upper bound applied to delay-node sleeps, in milliseconds.
    pub max_delay_ms: u64,
    /// Scheduler tick period.
    pub scheduler_tick: Duration,
    /// How long consumer shutdown waits for in-flight jobs.
    pub drain_timeout: Duration,
    /// How often the stale-lock scavenger runs.
    pub reclaim_interval: Duration,
    /// Age after which a `processing` lock counts as abandoned.
    pub reclaim_threshold: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            poll_interval: Duration::from_millis(500),
            backpressure: BackpressureThresholds::default(),
            idempotency_ttl: Duration::from_secs(300),
            idempotency_sweep_interval: Duration::from_secs(60),
            heartbeat_stall: Duration::from_secs(30),
            orchestrator_timeout: Duration::from_secs(300),
            max_delay_ms: 300_000,
            scheduler_tick: Duration::from_secs(60),
            drain_timeout: Duration::from_secs(30),
            reclaim_interval: Duration::from_secs(60),
            // Twice the heartbeat stall threshold: a live worker will have
            // heartbeated well within this window.
            reclaim_threshold: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default   |
    /// |-----------------------------|-----------|
    /// | `MAX_CONCURRENCY`           | `5`       |
    /// | `POLL_INTERVAL_MS`          | `500`     |
    /// | `BACKPRESSURE_LOW_WATER`    | `200`     |
    /// | `BACKPRESSURE_HIGH_WATER`   | `800`     |
    /// | `BACKPRESSURE_MAX_DEPTH`    | `1000`    |
    /// | `IDEMPOTENCY_TTL_MS`        | `300000`  |
    /// | `HEARTBEAT_STALL_MS`        | `30000`   |
    /// | `ORCHESTRATOR_TIMEOUT_MS`   | `300000`  |
    /// | `MAX_DELAY_MS`              | `300000`  |
    /// | `SCHEDULER_TICK_MS`         | `60000`   |
    /// | `DRAIN_TIMEOUT_MS`          | `30000`   |
    /// | `RECLAIM_THRESHOLD_MS`      | `60000`   |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrency: env_parse("MAX_CONCURRENCY", defaults.max_concurrency),
            poll_interval: env_millis("POLL_INTERVAL_MS", defaults.poll_interval),
            backpressure: BackpressureThresholds {
                low_water: env_parse("BACKPRESSURE_LOW_WATER", defaults.backpressure.low_water),
                high_water: env_parse("BACKPRESSURE_HIGH_WATER", defaults.backpressure.high_water),
                max_depth: env_parse("BACKPRESSURE_MAX_DEPTH", defaults.backpressure.max_depth),
            },
            idempotency_ttl: env_millis("IDEMPOTENCY_TTL_MS", defaults.idempotency_ttl),
            idempotency_sweep_interval: defaults.idempotency_sweep_interval,
            heartbeat_stall: env_millis("HEARTBEAT_STALL_MS", defaults.heartbeat_stall),
            orchestrator_timeout: env_millis(
                "ORCHESTRATOR_TIMEOUT_MS",
                defaults.orchestrator_timeout,
            ),
            max_delay_ms: env_parse("MAX_DELAY_MS", defaults.max_delay_ms),
            scheduler_tick: env_millis("SCHEDULER_TICK_MS", defaults.scheduler_tick),
            drain_timeout: env_millis("DRAIN_TIMEOUT_MS", defaults.drain_timeout),
            reclaim_interval: defaults.reclaim_interval,
            reclaim_threshold: env_millis("RECLAIM_THRESHOLD_MS", defaults.reclaim_threshold),
        }
    }
}

/// Parse an env var, panicking on malformed values (misconfiguration should
/// fail fast at startup).
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid value: {e}")),
        Err(_) => default,
    }
}

fn env_millis(name: &str, default: Duration) -> Duration {
    Duration::from_millis(env_parse(name, default.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_knobs() {
        let c = EngineConfig::default();
        assert_eq!(c.max_concurrency, 5);
        assert_eq!(c.poll_interval, Duration::from_millis(500));
        assert_eq!(c.backpressure.low_water, 200);
        assert_eq!(c.backpressure.high_water, 800);
        assert_eq!(c.backpressure.max_depth, 1000);
        assert_eq!(c.idempotency_ttl, Duration::from_secs(300));
        assert_eq!(c.heartbeat_stall, Duration::from_secs(30));
        assert_eq!(c.orchestrator_timeout, Duration::from_secs(300));
        assert_eq!(c.max_delay_ms, 300_000);
        assert_eq!(c.scheduler_tick, Duration::from_secs(60));
        assert_eq!(c.drain_timeout, Duration::from_secs(30));
    }
}
