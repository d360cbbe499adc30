//! Job and output item domain types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::JobStatus;
use crate::types::{JobId, Timestamp};

/// Free / paid classification of a style and the items generated from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Paid,
}

impl Tier {
    pub fn name(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Paid => "paid",
        }
    }

    /// Parse from the database `tier` column.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "free" => Ok(Self::Free),
            "paid" => Ok(Self::Paid),
            other => Err(CoreError::Validation(format!("Unknown tier '{other}'"))),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One generated image belonging to a job.
///
/// Items only exist once a URL is known: they are appended after
/// normalization and afterwards only mutated by regeneration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputItem {
    pub style_id: String,
    pub label: String,
    pub url: String,
    pub tier: Tier,
    pub regeneration_count: i32,
}

/// One submission's pipeline state.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    /// Submitter identity (normalized email address).
    pub submitter: String,
    pub status: JobStatus,
    pub photo_count: i16,
    pub training_ref: Option<String>,
    pub model_ref: Option<String>,
    pub is_paid: bool,
    pub payment_session_ref: Option<String>,
    /// Items in append order.
    pub items: Vec<OutputItem>,
    pub error_detail: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    pub fn item(&self, style_id: &str) -> Option<&OutputItem> {
        self.items.iter().find(|i| i.style_id == style_id)
    }

    /// Number of items of the given tier.
    pub fn tier_count(&self, tier: Tier) -> usize {
        self.items.iter().filter(|i| i.tier == tier).count()
    }
}

/// Insert payload for a brand-new job (always starts in `uploading`).
#[derive(Debug, Clone)]
pub struct NewJob {
    pub submitter: String,
    pub photo_count: i16,
}

/// Read-only projection returned to polling clients.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub status: JobStatus,
    pub error_detail: Option<String>,
    pub is_paid: bool,
    pub items: Vec<OutputItem>,
}

impl From<Job> for JobStatusView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            error_detail: job.error_detail,
            is_paid: job.is_paid,
            items: job.items,
        }
    }
}
