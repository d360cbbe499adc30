use std::time::Duration;

use expressr_core::tasks::LEASE_RENEW_SECS;

/// Task runner configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often the queue is polled for due tasks.
    pub poll_interval: Duration,
    /// Executions of one task before it is dead-lettered.
    pub max_attempts: i32,
    /// How often a running task's lease is extended.
    pub lease_renewal: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `WORKER_POLL_INTERVAL_MS` | `2000`  |
    /// | `TASK_MAX_ATTEMPTS`       | `5`     |
    pub fn from_env() -> Self {
        let poll_interval_ms: u64 = std::env::var("WORKER_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "2000".into())
            .parse()
            .expect("WORKER_POLL_INTERVAL_MS must be a valid u64");

        let max_attempts: i32 = std::env::var("TASK_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("TASK_MAX_ATTEMPTS must be a valid i32");

        Self {
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_attempts: max_attempts.max(1),
            lease_renewal: Duration::from_secs(LEASE_RENEW_SECS),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_attempts: 5,
            lease_renewal: Duration::from_secs(LEASE_RENEW_SECS),
        }
    }
}
