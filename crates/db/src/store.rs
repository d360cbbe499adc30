//! `JobStore` / `TaskQueue` implementations over the repositories.

use std::collections::HashMap;

use async_trait::async_trait;
use expressr_core::error::CoreError;
use expressr_core::job::{Job, NewJob};
use expressr_core::store::{JobStore, JobUpdate};
use expressr_core::tasks::{PipelineTask, TaskKind, TaskQueue};
use expressr_core::types::{DbId, JobId, Timestamp};

use crate::models::job::{JobRow, OutputItemRow};
use crate::repositories::{JobRepo, OutputItemRepo, TaskRepo};
use crate::DbPool;

fn db_err(e: sqlx::Error) -> CoreError {
    tracing::error!(error = %e, "Database error");
    CoreError::Internal(format!("database error: {e}"))
}

/// Postgres-backed job store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, row: JobRow) -> Result<Job, CoreError> {
        let items = OutputItemRepo::list_for_job(&self.pool, row.id)
            .await
            .map_err(db_err)?;
        row.into_job(items)
    }

    async fn hydrate_many(&self, rows: Vec<JobRow>) -> Result<Vec<Job>, CoreError> {
        let ids: Vec<JobId> = rows.iter().map(|r| r.id).collect();
        let mut by_job: HashMap<JobId, Vec<OutputItemRow>> = HashMap::new();
        for item in OutputItemRepo::list_for_jobs(&self.pool, &ids)
            .await
            .map_err(db_err)?
        {
            by_job.entry(item.job_id).or_default().push(item);
        }
        rows.into_iter()
            .map(|row| {
                let items = by_job.remove(&row.id).unwrap_or_default();
                row.into_job(items)
            })
            .collect()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, new: NewJob) -> Result<Job, CoreError> {
        let row = JobRepo::create(&self.pool, uuid::Uuid::now_v7(), &new)
            .await
            .map_err(db_err)?;
        row.into_job(Vec::new())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, CoreError> {
        match JobRepo::find_by_id(&self.pool, id).await.map_err(db_err)? {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn find_by_training_ref(&self, training_ref: &str) -> Result<Option<Job>, CoreError> {
        match JobRepo::find_by_training_ref(&self.pool, training_ref)
            .await
            .map_err(db_err)?
        {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn find_recent_by_submitter(
        &self,
        submitter: &str,
        since: Timestamp,
        exclude: Option<JobId>,
    ) -> Result<Option<Job>, CoreError> {
        match JobRepo::find_recent_by_submitter(&self.pool, submitter, since, exclude)
            .await
            .map_err(db_err)?
        {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_by_submitter(&self, submitter: &str) -> Result<Vec<Job>, CoreError> {
        let rows = JobRepo::list_by_submitter(&self.pool, submitter)
            .await
            .map_err(db_err)?;
        self.hydrate_many(rows).await
    }

    async fn apply(&self, id: JobId, update: JobUpdate) -> Result<Option<Job>, CoreError> {
        match JobRepo::apply(&self.pool, id, &update).await.map_err(db_err)? {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn replace_item_url(
        &self,
        id: JobId,
        style_id: &str,
        url: &str,
        expected_count: i32,
        new_count: i32,
    ) -> Result<bool, CoreError> {
        OutputItemRepo::replace_url(&self.pool, id, style_id, url, expected_count, new_count)
            .await
            .map_err(db_err)
    }
}

/// Postgres-backed pipeline task queue.
#[derive(Clone)]
pub struct PgTaskQueue {
    pool: DbPool,
}

impl PgTaskQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn enqueue(&self, job_id: JobId, kind: TaskKind) -> Result<(), CoreError> {
        let inserted = TaskRepo::enqueue(&self.pool, job_id, kind)
            .await
            .map_err(db_err)?;
        if !inserted {
            tracing::debug!(job_id = %job_id, kind = %kind, "Task already pending");
        }
        Ok(())
    }

    async fn claim_next(&self, now: Timestamp) -> Result<Option<PipelineTask>, CoreError> {
        TaskRepo::claim_next(&self.pool, now)
            .await
            .map_err(db_err)?
            .map(PipelineTask::try_from)
            .transpose()
    }

    async fn complete(&self, task_id: DbId) -> Result<(), CoreError> {
        TaskRepo::delete(&self.pool, task_id).await.map_err(db_err)
    }

    async fn retry(&self, task_id: DbId, run_after: Timestamp, error: &str) -> Result<(), CoreError> {
        TaskRepo::retry(&self.pool, task_id, run_after, error)
            .await
            .map_err(db_err)
    }

    async fn extend_lease(&self, task_id: DbId, locked_until: Timestamp) -> Result<bool, CoreError> {
        TaskRepo::extend_lease(&self.pool, task_id, locked_until)
            .await
            .map_err(db_err)
    }

    async fn defer(&self, task_id: DbId, run_after: Timestamp) -> Result<(), CoreError> {
        TaskRepo::defer(&self.pool, task_id, run_after)
            .await
            .map_err(db_err)
    }

    async fn dead_letter(&self, task_id: DbId, error: &str) -> Result<(), CoreError> {
        TaskRepo::mark_dead(&self.pool, task_id, error)
            .await
            .map_err(db_err)
    }
}
