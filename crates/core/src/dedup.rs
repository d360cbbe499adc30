//! Duplicate-submission cool-down.
//!
//! A query-time check, not a lock: the store is asked for the newest job
//! of the submitter created inside the window, and any hit is a conflict.

use chrono::Duration;

use crate::error::CoreError;
use crate::job::Job;
use crate::types::Timestamp;

/// Cool-down window between two submissions from the same identity.
pub const DEDUP_WINDOW_MINUTES: i64 = 30;

/// Earliest creation time that still counts as a duplicate at `now`.
pub fn window_start(now: Timestamp) -> Timestamp {
    now - Duration::minutes(DEDUP_WINDOW_MINUTES)
}

/// Reject when a recent job exists.
pub fn ensure_no_recent(recent: Option<&Job>) -> Result<(), CoreError> {
    match recent {
        Some(existing) => Err(CoreError::DuplicateJob {
            existing_job_id: existing.id,
        }),
        None => Ok(()),
    }
}
