//! Repository for the `output_items` table.

use expressr_core::job::OutputItem;
use expressr_core::types::JobId;
use sqlx::{PgConnection, PgPool};

use crate::models::job::OutputItemRow;

/// Column list for `output_items` queries.
const COLUMNS: &str = "id, job_id, style_id, label, url, tier, regeneration_count";

pub struct OutputItemRepo;

impl OutputItemRepo {
    /// Items of one job in append order.
    pub async fn list_for_job(pool: &PgPool, job_id: JobId) -> Result<Vec<OutputItemRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM output_items WHERE job_id = $1 ORDER BY id");
        sqlx::query_as::<_, OutputItemRow>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Items of several jobs, grouped by caller.
    pub async fn list_for_jobs(
        pool: &PgPool,
        job_ids: &[JobId],
    ) -> Result<Vec<OutputItemRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM output_items WHERE job_id = ANY($1) ORDER BY job_id, id"
        );
        sqlx::query_as::<_, OutputItemRow>(&query)
            .bind(job_ids)
            .fetch_all(pool)
            .await
    }

    /// Append items; a style already present on the job is left untouched.
    pub async fn append(
        conn: &mut PgConnection,
        job_id: JobId,
        items: &[OutputItem],
    ) -> Result<u64, sqlx::Error> {
        let mut inserted = 0;
        for item in items {
            let result = sqlx::query(
                "INSERT INTO output_items (job_id, style_id, label, url, tier, regeneration_count) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (job_id, style_id) DO NOTHING",
            )
            .bind(job_id)
            .bind(&item.style_id)
            .bind(&item.label)
            .bind(&item.url)
            .bind(item.tier.name())
            .bind(item.regeneration_count)
            .execute(&mut *conn)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    /// Swap an item's URL if its count is still `expected_count`.
    pub async fn replace_url(
        pool: &PgPool,
        job_id: JobId,
        style_id: &str,
        url: &str,
        expected_count: i32,
        new_count: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE output_items \
             SET url = $4, regeneration_count = $5, updated_at = NOW() \
             WHERE job_id = $1 AND style_id = $2 AND regeneration_count = $3",
        )
        .bind(job_id)
        .bind(style_id)
        .bind(expected_count)
        .bind(url)
        .bind(new_count)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
