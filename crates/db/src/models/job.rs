//! Rows of the `jobs` and `output_items` tables.

use expressr_core::error::CoreError;
use expressr_core::job::{Job, OutputItem, Tier};
use expressr_core::status::{JobStatus, StatusId};
use expressr_core::types::{DbId, JobId, Timestamp};
use sqlx::FromRow;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: JobId,
    pub submitter: String,
    pub status_id: StatusId,
    pub photo_count: i16,
    pub training_ref: Option<String>,
    pub model_ref: Option<String>,
    pub is_paid: bool,
    pub payment_session_ref: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `output_items` table.
#[derive(Debug, Clone, FromRow)]
pub struct OutputItemRow {
    pub id: DbId,
    pub job_id: JobId,
    pub style_id: String,
    pub label: String,
    pub url: String,
    pub tier: String,
    pub regeneration_count: i32,
}

impl TryFrom<OutputItemRow> for OutputItem {
    type Error = CoreError;

    fn try_from(row: OutputItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            style_id: row.style_id,
            label: row.label,
            url: row.url,
            tier: Tier::from_name(&row.tier)?,
            regeneration_count: row.regeneration_count,
        })
    }
}

impl JobRow {
    /// Combine the job row with its items (already in append order).
    pub fn into_job(self, items: Vec<OutputItemRow>) -> Result<Job, CoreError> {
        let status = JobStatus::from_id(self.status_id).ok_or_else(|| {
            CoreError::Internal(format!(
                "job {} has unknown status_id {}",
                self.id, self.status_id
            ))
        })?;
        let items = items
            .into_iter()
            .map(OutputItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Job {
            id: self.id,
            submitter: self.submitter,
            status,
            photo_count: self.photo_count,
            training_ref: self.training_ref,
            model_ref: self.model_ref,
            is_paid: self.is_paid,
            payment_session_ref: self.payment_session_ref,
            items,
            error_detail: self.error_detail,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
