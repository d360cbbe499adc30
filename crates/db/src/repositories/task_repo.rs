//! Repository for the `pipeline_tasks` table.

use expressr_core::tasks::{TaskKind, LEASE_SECS};
use expressr_core::types::{DbId, JobId, Timestamp};
use sqlx::PgPool;

use crate::models::task::TaskRow;

/// Column list for `pipeline_tasks` queries.
const COLUMNS: &str = "id, job_id, kind, attempts, run_after";

pub struct TaskRepo;

impl TaskRepo {
    /// Insert a task unless a live one already exists for `(job_id, kind)`.
    ///
    /// Returns `true` if a row was inserted.
    pub async fn enqueue(pool: &PgPool, job_id: JobId, kind: TaskKind) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO pipeline_tasks (job_id, kind) VALUES ($1, $2) \
             ON CONFLICT (job_id, kind) WHERE NOT dead DO NOTHING",
        )
        .bind(job_id)
        .bind(kind.name())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically claim the oldest due task.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never
    /// claim the same row; the lease hides the task until it expires.
    pub async fn claim_next(pool: &PgPool, now: Timestamp) -> Result<Option<TaskRow>, sqlx::Error> {
        let query = format!(
            "UPDATE pipeline_tasks \
             SET locked_until = $1 + make_interval(secs => $2), updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM pipeline_tasks \
                 WHERE NOT dead AND run_after <= $1 \
                   AND (locked_until IS NULL OR locked_until < $1) \
                 ORDER BY run_after ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(now)
            .bind(LEASE_SECS as f64)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM pipeline_tasks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Count a failed attempt and reschedule.
    pub async fn retry(
        pool: &PgPool,
        id: DbId,
        run_after: Timestamp,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE pipeline_tasks \
             SET attempts = attempts + 1, run_after = $2, last_error = $3, \
                 locked_until = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(run_after)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Push a held lease forward. Returns `false` if the task is not claimed.
    pub async fn extend_lease(
        pool: &PgPool,
        id: DbId,
        locked_until: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE pipeline_tasks \
             SET locked_until = $2, updated_at = NOW() \
             WHERE id = $1 AND dead = FALSE AND locked_until IS NOT NULL",
        )
        .bind(id)
        .bind(locked_until)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Reschedule without counting an attempt.
    pub async fn defer(pool: &PgPool, id: DbId, run_after: Timestamp) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE pipeline_tasks \
             SET run_after = $2, locked_until = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(run_after)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Park a task permanently. Dead rows no longer block re-enqueueing.
    pub async fn mark_dead(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE pipeline_tasks \
             SET dead = TRUE, attempts = attempts + 1, last_error = $2, \
                 locked_until = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
