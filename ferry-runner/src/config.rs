//! Runner configuration
//!
//! Defines all configurable parameters for the runner including polling
//! intervals, execution limits, retry policy and where external tools live.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::service::RetryPolicy;

/// Runner configuration
///
/// All timeouts and intervals are configurable to allow tuning
/// for different deployment scenarios (dev vs prod, fast vs slow providers).
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this runner instance
    pub runner_id: String,

    /// Orchestrator base URL (e.g., "http://localhost:8080")
    pub orchestrator_url: String,

    /// How often to poll the orchestrator for new work
    pub poll_interval: Duration,

    /// How often to send buffered run-log entries to the orchestrator
    pub log_send_interval: Duration,

    /// Max deployments and pipeline runs handled at once
    pub max_parallel_jobs: usize,

    /// Max operations applied at once within one deployment
    pub max_parallel_operations: usize,

    /// Upper bound for a single attempt of an operation
    pub operation_timeout: Duration,

    /// Backoff for transient failures
    pub retry: RetryPolicy,

    /// Directory holding one provider hook executable per resource kind
    pub hooks_dir: PathBuf,

    /// Docker CLI used by the build and push stages
    pub docker_bin: String,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(runner_id: String, orchestrator_url: String) -> Self {
        Self {
            runner_id,
            orchestrator_url,
            poll_interval: Duration::from_secs(5),
            log_send_interval: Duration::from_secs(5),
            max_parallel_jobs: 2,
            max_parallel_operations: 4,
            operation_timeout: Duration::from_secs(300), // 5 minutes
            retry: RetryPolicy::default(),
            hooks_dir: PathBuf::from("hooks"),
            docker_bin: "docker".to_string(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - RUNNER_ID (required)
    /// - ORCHESTRATOR_URL (required)
    /// - POLL_INTERVAL (optional, seconds, default: 5)
    /// - LOG_SEND_INTERVAL (optional, seconds, default: 5)
    /// - MAX_PARALLEL_JOBS (optional, default: 2)
    /// - MAX_PARALLEL_OPERATIONS (optional, default: 4)
    /// - OPERATION_TIMEOUT (optional, seconds, default: 300)
    /// - RETRY_MAX_ATTEMPTS (optional, default: 5)
    /// - RETRY_INITIAL_DELAY_MS (optional, default: 500)
    /// - RETRY_MAX_DELAY_MS (optional, default: 30000)
    /// - HOOKS_DIR (optional, default: ./hooks)
    /// - DOCKER_BIN (optional, default: docker)
    pub fn from_env() -> anyhow::Result<Self> {
        let runner_id = std::env::var("RUNNER_ID")
            .map_err(|_| anyhow::anyhow!("RUNNER_ID environment variable not set"))?;

        let orchestrator_url = std::env::var("ORCHESTRATOR_URL")
            .map_err(|_| anyhow::anyhow!("ORCHESTRATOR_URL environment variable not set"))?;

        let defaults = Self::new(runner_id, orchestrator_url);

        Ok(Self {
            poll_interval: env_secs("POLL_INTERVAL", defaults.poll_interval),
            log_send_interval: env_secs("LOG_SEND_INTERVAL", defaults.log_send_interval),
            max_parallel_jobs: env_or("MAX_PARALLEL_JOBS", defaults.max_parallel_jobs),
            max_parallel_operations: env_or(
                "MAX_PARALLEL_OPERATIONS",
                defaults.max_parallel_operations,
            ),
            operation_timeout: env_secs("OPERATION_TIMEOUT", defaults.operation_timeout),
            retry: RetryPolicy {
                max_attempts: env_or("RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts),
                initial_delay: env_millis("RETRY_INITIAL_DELAY_MS", defaults.retry.initial_delay),
                max_delay: env_millis("RETRY_MAX_DELAY_MS", defaults.retry.max_delay),
            },
            hooks_dir: std::env::var("HOOKS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.hooks_dir.clone()),
            docker_bin: std::env::var("DOCKER_BIN").unwrap_or(defaults.docker_bin.clone()),
            ..defaults
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runner_id.is_empty() {
            anyhow::bail!("runner_id cannot be empty");
        }

        if self.orchestrator_url.is_empty() {
            anyhow::bail!("orchestrator_url cannot be empty");
        }

        if !self.orchestrator_url.starts_with("http://")
            && !self.orchestrator_url.starts_with("https://")
        {
            anyhow::bail!("orchestrator_url must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.log_send_interval.is_zero() {
            anyhow::bail!("log_send_interval must be greater than 0");
        }

        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        if self.max_parallel_operations == 0 {
            anyhow::bail!("max_parallel_operations must be greater than 0");
        }

        if self.operation_timeout.is_zero() {
            anyhow::bail!("operation_timeout must be greater than 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry max_attempts must be at least 1");
        }

        if self.retry.initial_delay > self.retry.max_delay {
            anyhow::bail!("retry initial delay cannot exceed the max delay");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "http://localhost:8080".to_string(),
        )
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_millis(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.operation_timeout, Duration::from_secs(300));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(config.retry.max_delay, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Empty runner_id should fail
        config.runner_id = String::new();
        assert!(config.validate().is_err());

        config.runner_id = "test".to_string();

        // Invalid URL should fail
        config.orchestrator_url = "not-a-url".to_string();
        assert!(config.validate().is_err());

        config.orchestrator_url = "http://localhost:8080".to_string();
        assert!(config.validate().is_ok());

        config.max_parallel_operations = 0;
        assert!(config.validate().is_err());
        config.max_parallel_operations = 1;

        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
        config.retry.max_attempts = 3;

        config.retry.initial_delay = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparsable_env_values_fall_back_to_defaults() {
        assert_eq!(env_or("FERRY_TEST_UNSET_VARIABLE", 7usize), 7);
        assert_eq!(
            env_secs("FERRY_TEST_UNSET_VARIABLE", Duration::from_secs(3)),
            Duration::from_secs(3)
        );
    }
}
