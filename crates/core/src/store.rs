//! Job persistence contract.
//!
//! The persisted job row is the single synchronization point between
//! concurrent webhook handlers, client requests and the worker. Every
//! mutation therefore goes through [`JobStore::apply`] with an explicit
//! guard; a guard that no longer matches the stored row is reported as
//! `Ok(None)`, never as an error.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::job::{Job, NewJob, OutputItem};
use crate::status::JobStatus;
use crate::types::{JobId, Timestamp};

/// A conditional, atomic change to one job.
///
/// Fields left `None` are not touched. `items` are appended (duplicates by
/// style id are ignored) in the same atomic step as the field updates.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    /// Apply only if the current status is one of these.
    pub expect_status: Option<Vec<JobStatus>>,
    /// Apply only if the payment flag currently has this value.
    pub expect_paid: Option<bool>,

    pub status: Option<JobStatus>,
    pub training_ref: Option<String>,
    pub model_ref: Option<String>,
    pub is_paid: Option<bool>,
    pub payment_session_ref: Option<String>,
    pub error_detail: Option<String>,
    pub items: Vec<OutputItem>,
}

impl JobUpdate {
    /// Move to `to`, guarded by every legal predecessor of `to`.
    pub fn transition(to: JobStatus) -> Self {
        Self {
            expect_status: Some(JobStatus::predecessors(to)),
            status: Some(to),
            ..Self::default()
        }
    }

    /// Leave the status alone but require it to be one of `statuses`.
    pub fn guarded(statuses: &[JobStatus]) -> Self {
        Self {
            expect_status: Some(statuses.to_vec()),
            ..Self::default()
        }
    }

    pub fn only_if_unpaid(mut self) -> Self {
        self.expect_paid = Some(false);
        self
    }

    pub fn with_training_ref(mut self, training_ref: impl Into<String>) -> Self {
        self.training_ref = Some(training_ref.into());
        self
    }

    pub fn with_model_ref(mut self, model_ref: impl Into<String>) -> Self {
        self.model_ref = Some(model_ref.into());
        self
    }

    pub fn with_paid(mut self, session_ref: Option<String>) -> Self {
        self.is_paid = Some(true);
        self.payment_session_ref = session_ref;
        self
    }

    pub fn with_session_ref(mut self, session_ref: impl Into<String>) -> Self {
        self.payment_session_ref = Some(session_ref.into());
        self
    }

    pub fn with_error(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    pub fn with_items(mut self, items: Vec<OutputItem>) -> Self {
        self.items = items;
        self
    }

    /// Whether `job` satisfies this update's guards.
    pub fn matches(&self, job: &Job) -> bool {
        let status_ok = self
            .expect_status
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&job.status));
        let paid_ok = self.expect_paid.map_or(true, |paid| paid == job.is_paid);
        status_ok && paid_ok
    }
}

/// Storage for jobs and their output items.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job in `uploading`.
    async fn create(&self, new: NewJob) -> Result<Job, CoreError>;

    /// Load a job with its items in append order.
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, CoreError>;

    async fn find_by_training_ref(&self, training_ref: &str) -> Result<Option<Job>, CoreError>;

    /// Newest job of `submitter` created at or after `since`, optionally
    /// ignoring one job id.
    async fn find_recent_by_submitter(
        &self,
        submitter: &str,
        since: Timestamp,
        exclude: Option<JobId>,
    ) -> Result<Option<Job>, CoreError>;

    /// Every job of `submitter`, newest first.
    async fn list_by_submitter(&self, submitter: &str) -> Result<Vec<Job>, CoreError>;

    /// Apply `update` atomically if its guards hold.
    ///
    /// Returns the updated job, or `None` when the job is missing or a guard
    /// did not match.
    async fn apply(&self, id: JobId, update: JobUpdate) -> Result<Option<Job>, CoreError>;

    /// Replace one item's URL and set its regeneration count, only if the
    /// stored count still equals `expected_count`.
    ///
    /// Returns `false` when another regeneration won the race.
    async fn replace_item_url(
        &self,
        id: JobId,
        style_id: &str,
        url: &str,
        expected_count: i32,
        new_count: i32,
    ) -> Result<bool, CoreError>;
}
