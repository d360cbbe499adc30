//! Rows of the `pipeline_tasks` table.

use expressr_core::error::CoreError;
use expressr_core::tasks::{PipelineTask, TaskKind};
use expressr_core::types::{DbId, JobId, Timestamp};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: DbId,
    pub job_id: JobId,
    pub kind: String,
    pub attempts: i32,
    pub run_after: Timestamp,
}

impl TryFrom<TaskRow> for PipelineTask {
    type Error = CoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let kind = TaskKind::from_name(&row.kind).ok_or_else(|| {
            CoreError::Internal(format!("task {} has unknown kind '{}'", row.id, row.kind))
        })?;
        Ok(Self {
            id: row.id,
            job_id: row.job_id,
            kind,
            attempts: row.attempts,
            run_after: row.run_after,
        })
    }
}
