//! Durable stage triggers.
//!
//! Pipeline stages that must run after a webhook or a prior stage are
//! enqueued as tasks instead of being fired in-process, so a crash or a
//! redeploy cannot drop them.

use std::fmt;

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, JobId, Timestamp};

/// Base delay for the first retry of a failed task.
pub const RETRY_BASE_SECS: i64 = 15;

/// Upper bound for the retry delay.
pub const RETRY_MAX_SECS: i64 = 15 * 60;

/// Delay applied when a task is deferred because its job is not ready.
pub const DEFER_SECS: i64 = 20;

/// How long a claimed task stays invisible to other workers.
pub const LEASE_SECS: i64 = 15 * 60;

/// How often a running task's lease is pushed forward by [`LEASE_SECS`].
pub const LEASE_RENEW_SECS: u64 = (LEASE_SECS / 3) as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    GenerateFree,
    GenerateFull,
}

impl TaskKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::GenerateFree => "generate_free",
            Self::GenerateFull => "generate_full",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "generate_free" => Some(Self::GenerateFree),
            "generate_full" => Some(Self::GenerateFull),
            _ => None,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A claimed unit of pipeline work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTask {
    pub id: DbId,
    pub job_id: JobId,
    pub kind: TaskKind,
    /// Failed executions so far (deferrals do not count).
    pub attempts: i32,
    pub run_after: Timestamp,
}

/// Exponential backoff for the `attempts`-th retry (1-based), capped.
pub fn retry_delay(attempts: i32) -> Duration {
    let exp = attempts.clamp(1, 16) - 1;
    let secs = RETRY_BASE_SECS.saturating_mul(1_i64 << exp);
    Duration::seconds(secs.min(RETRY_MAX_SECS))
}

/// Durable work queue for stage triggers.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue `kind` for `job_id`.
    ///
    /// At most one pending task per `(job_id, kind)` exists; enqueuing a
    /// duplicate is a no-op that still returns `Ok`.
    async fn enqueue(&self, job_id: JobId, kind: TaskKind) -> Result<(), CoreError>;

    /// Claim the oldest due task, hiding it from other workers for the
    /// lease duration.
    async fn claim_next(&self, now: Timestamp) -> Result<Option<PipelineTask>, CoreError>;

    /// Remove a finished task.
    async fn complete(&self, task_id: DbId) -> Result<(), CoreError>;

    /// Record a failed execution and make the task due again at `run_after`.
    async fn retry(
        &self,
        task_id: DbId,
        run_after: Timestamp,
        error: &str,
    ) -> Result<(), CoreError>;

    /// Keep a claimed task hidden from other workers until `locked_until`.
    ///
    /// Returns `false` when the task is no longer claimed.
    async fn extend_lease(
        &self,
        task_id: DbId,
        locked_until: Timestamp,
    ) -> Result<bool, CoreError>;

    /// Make the task due again at `run_after` without counting an attempt.
    async fn defer(&self, task_id: DbId, run_after: Timestamp) -> Result<(), CoreError>;

    /// Give up on a task after its final attempt.
    async fn dead_letter(&self, task_id: DbId, error: &str) -> Result<(), CoreError>;
}
