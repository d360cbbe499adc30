//! Repository for the `jobs` table.
//!
//! Every status change is a conditional update: the `WHERE` clause carries
//! the allowed predecessor statuses, so a concurrent webhook-driven write
//! can never be clobbered. Zero affected rows means "guard did not match".

use expressr_core::job::NewJob;
use expressr_core::status::{JobStatus, StatusId};
use expressr_core::store::JobUpdate;
use expressr_core::types::{JobId, Timestamp};
use sqlx::PgPool;

use crate::models::job::JobRow;
use crate::repositories::OutputItemRepo;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, submitter, status_id, photo_count, training_ref, model_ref, \
    is_paid, payment_session_ref, error_detail, created_at, updated_at";

/// Provides conditional reads and writes for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job in `uploading`.
    pub async fn create(pool: &PgPool, id: JobId, input: &NewJob) -> Result<JobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (id, submitter, status_id, photo_count) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(&input.submitter)
            .bind(JobStatus::Uploading.id())
            .bind(input.photo_count)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_training_ref(
        pool: &PgPool,
        training_ref: &str,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE training_ref = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(training_ref)
            .fetch_optional(pool)
            .await
    }

    /// Newest job for `submitter` created at or after `since`.
    pub async fn find_recent_by_submitter(
        pool: &PgPool,
        submitter: &str,
        since: Timestamp,
        exclude: Option<JobId>,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE submitter = $1 AND created_at >= $2 \
               AND ($3::UUID IS NULL OR id <> $3) \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(submitter)
            .bind(since)
            .bind(exclude)
            .fetch_optional(pool)
            .await
    }

    /// All jobs for `submitter`, newest first.
    pub async fn list_by_submitter(
        pool: &PgPool,
        submitter: &str,
    ) -> Result<Vec<JobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE submitter = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(submitter)
            .fetch_all(pool)
            .await
    }

    /// Apply a guarded update and append its items in one transaction.
    ///
    /// Returns `None` if the job is missing or a guard did not match; in
    /// that case nothing is written.
    pub async fn apply(
        pool: &PgPool,
        id: JobId,
        update: &JobUpdate,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let expect_status: Option<Vec<StatusId>> = update
            .expect_status
            .as_ref()
            .map(|statuses| statuses.iter().map(|s| s.id()).collect());

        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE jobs SET \
                 status_id = COALESCE($2, status_id), \
                 training_ref = COALESCE($3, training_ref), \
                 model_ref = COALESCE($4, model_ref), \
                 is_paid = COALESCE($5, is_paid), \
                 payment_session_ref = COALESCE($6, payment_session_ref), \
                 error_detail = COALESCE($7, error_detail), \
                 updated_at = NOW() \
             WHERE id = $1 \
               AND ($8::SMALLINT[] IS NULL OR status_id = ANY($8)) \
               AND ($9::BOOLEAN IS NULL OR is_paid = $9) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(update.status.map(JobStatus::id))
            .bind(update.training_ref.as_deref())
            .bind(update.model_ref.as_deref())
            .bind(update.is_paid)
            .bind(update.payment_session_ref.as_deref())
            .bind(update.error_detail.as_deref())
            .bind(expect_status)
            .bind(update.expect_paid)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        if !update.items.is_empty() {
            OutputItemRepo::append(&mut *tx, id, &update.items).await?;
        }

        tx.commit().await?;
        Ok(Some(row))
    }
}
