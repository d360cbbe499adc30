//! Durable task runner.
//!
//! Polls the [`TaskQueue`] on a fixed interval, runs every due task through
//! the orchestrator and settles it:
//!
//! - `Completed` removes the task.
//! - `Deferred` pushes it back without consuming an attempt.
//! - An error reschedules it with exponential backoff, or dead-letters it
//!   once `max_attempts` executions have failed. A dead-lettered task
//!   leaves an error note on its job.
//!
//! A running task's lease is extended periodically so a long batch is not
//! claimed a second time.

use std::sync::Arc;

use chrono::Utc;
use expressr_core::error::CoreError;
use expressr_core::tasks::{retry_delay, PipelineTask, TaskQueue, DEFER_SECS, LEASE_SECS};
use expressr_pipeline::{JobOrchestrator, TaskOutcome};
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

pub struct TaskRunner {
    orchestrator: Arc<JobOrchestrator>,
    queue: Arc<dyn TaskQueue>,
    config: WorkerConfig,
}

impl TaskRunner {
    pub fn new(
        orchestrator: Arc<JobOrchestrator>,
        queue: Arc<dyn TaskQueue>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            orchestrator,
            queue,
            config,
        }
    }

    /// Run the polling loop until `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_attempts = self.config.max_attempts,
            "Task runner started",
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Task runner stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.drain(&cancel).await {
                        tracing::error!(error = %e, "Task runner poll failed");
                    }
                }
            }
        }
    }

    /// Run due tasks until none are left or `cancel` fires.
    ///
    /// Returns how many tasks were executed.
    pub async fn drain(&self, cancel: &CancellationToken) -> Result<usize, CoreError> {
        let mut executed = 0;
        while !cancel.is_cancelled() {
            if !self.run_next().await? {
                break;
            }
            executed += 1;
        }
        Ok(executed)
    }

    /// Claim and settle one due task. Returns `false` when none is due.
    pub async fn run_next(&self) -> Result<bool, CoreError> {
        let Some(task) = self.queue.claim_next(Utc::now()).await? else {
            return Ok(false);
        };
        self.execute(&task).await?;
        Ok(true)
    }

    /// Run the task, extending its lease every `lease_renewal` while it runs.
    async fn handle_with_lease(&self, task: &PipelineTask) -> Result<TaskOutcome, CoreError> {
        let work = self.orchestrator.handle_task(task);
        tokio::pin!(work);

        let every = self.config.lease_renewal;
        let mut renew = interval_at(Instant::now() + every, every);
        loop {
            tokio::select! {
                result = &mut work => return result,
                _ = renew.tick() => {
                    let until = Utc::now() + chrono::Duration::seconds(LEASE_SECS);
                    match self.queue.extend_lease(task.id, until).await {
                        Ok(true) => tracing::debug!(task_id = task.id, %until, "Lease extended"),
                        Ok(false) => tracing::warn!(task_id = task.id, "Lease lost while running"),
                        Err(e) => tracing::warn!(task_id = task.id, error = %e, "Lease extension failed"),
                    }
                }
            }
        }
    }

    async fn execute(&self, task: &PipelineTask) -> Result<(), CoreError> {
        tracing::debug!(
            task_id = task.id,
            job_id = %task.job_id,
            kind = %task.kind,
            attempts = task.attempts,
            "Running task",
        );

        match self.handle_with_lease(task).await {
            Ok(TaskOutcome::Completed) => {
                self.queue.complete(task.id).await?;
                tracing::info!(task_id = task.id, job_id = %task.job_id, kind = %task.kind, "Task completed");
            }
            Ok(TaskOutcome::Deferred) => {
                let run_after = Utc::now() + chrono::Duration::seconds(DEFER_SECS);
                self.queue.defer(task.id, run_after).await?;
                tracing::debug!(task_id = task.id, job_id = %task.job_id, kind = %task.kind, "Task deferred");
            }
            Err(e) => {
                let executions = task.attempts + 1;
                if executions >= self.config.max_attempts {
                    tracing::error!(
                        task_id = task.id,
                        job_id = %task.job_id,
                        kind = %task.kind,
                        executions,
                        error = %e,
                        "Task dead-lettered",
                    );
                    self.queue.dead_letter(task.id, &e.to_string()).await?;
                    if let Err(note_err) = self.orchestrator.on_task_abandoned(task).await {
                        tracing::error!(
                            task_id = task.id,
                            job_id = %task.job_id,
                            error = %note_err,
                            "Failed to record abandoned task on job",
                        );
                    }
                } else {
                    let delay = retry_delay(executions);
                    tracing::warn!(
                        task_id = task.id,
                        job_id = %task.job_id,
                        kind = %task.kind,
                        executions,
                        retry_in_secs = delay.num_seconds(),
                        error = %e,
                        "Task failed, will retry",
                    );
                    self.queue
                        .retry(task.id, Utc::now() + delay, &e.to_string())
                        .await?;
                }
            }
        }
        Ok(())
    }
}
