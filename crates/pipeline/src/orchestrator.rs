//! Job orchestration.
//!
//! [`JobOrchestrator`] is the only component that mutates jobs. Every write
//! goes through [`JobStore::apply`] with a predecessor guard, so a late or
//! repeated webhook, a retried task and a concurrent request can all run
//! the same handler without clobbering each other: whichever write lands
//! first wins and the rest become no-ops.
//!
//! Stage chaining is durable. A training success enqueues
//! [`TaskKind::GenerateFree`]; a payment enqueues [`TaskKind::GenerateFull`].
//! The worker claims those tasks and calls [`JobOrchestrator::handle_task`].

use std::sync::Arc;

use chrono::Utc;
use expressr_core::dedup;
use expressr_core::error::CoreError;
use expressr_core::job::{Job, JobStatusView, NewJob, OutputItem, Tier};
use expressr_core::providers::{
    BlobFetcher, CheckoutItem, CheckoutRequest, CheckoutSession, InferenceProvider, Mailer,
    ObjectStorage, PaymentProvider, TrainingOutcome, TrainingProvider, TrainingRequest,
};
use expressr_core::quota;
use expressr_core::status::JobStatus;
use expressr_core::store::{JobStore, JobUpdate};
use expressr_core::styles::{self, StyleDescriptor, TRIGGER_TOKEN};
use expressr_core::tasks::{PipelineTask, TaskKind, TaskQueue};
use expressr_core::types::JobId;
use expressr_core::validation::{normalize_submitter, validate_photo_count};
use expressr_events::{event_types, templates, EventBus, PlatformEvent};
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;

use crate::archive;
use crate::driver::{GenerationConfig, GenerationDriver, StyleOutcome};
use crate::normalizer::OutputNormalizer;

/// Error detail stored when the training provider reports failure.
pub const TRAINING_FAILED_MESSAGE: &str = "Training failed on provider side.";

/// Error detail stored when a generation task is given up on.
pub const GENERATION_STALLED_MESSAGE: &str =
    "Generation stopped after repeated failures. Contact support to resume.";

/// Parallel photo downloads during training ingest.
const PHOTO_FETCH_CONCURRENCY: usize = 4;

/// Settings the orchestrator needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Public base URL of the web app, used for links and redirects.
    pub app_url: String,
    /// Callback URL handed to the training provider.
    pub training_webhook_url: Option<String>,
    pub price_cents: i64,
    pub currency: String,
}

impl OrchestratorConfig {
    pub fn new(app_url: impl Into<String>, price_cents: i64) -> Self {
        let app_url = app_url.into().trim_end_matches('/').to_string();
        Self {
            training_webhook_url: Some(format!("{app_url}/api/v1/webhooks/training")),
            app_url,
            price_cents,
            currency: "usd".to_string(),
        }
    }
}

/// External handles injected into the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub events: Arc<EventBus>,
    pub training: Arc<dyn TrainingProvider>,
    pub inference: Arc<dyn InferenceProvider>,
    pub payments: Arc<dyn PaymentProvider>,
    pub storage: Arc<dyn ObjectStorage>,
    pub fetcher: Arc<dyn BlobFetcher>,
    /// `None` disables recovery emails.
    pub mailer: Option<Arc<dyn Mailer>>,
}

/// How a webhook delivery was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    /// The event changed the job.
    Applied,
    /// The job had already absorbed this event.
    Duplicate,
    /// No job matches the reference.
    Unmatched,
    /// The event carries nothing to act on.
    Ignored,
}

/// Result of running one pipeline task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The stage ran or has nothing left to do; drop the task.
    Completed,
    /// The job is not ready for this stage yet; try again later.
    Deferred,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegenerateResult {
    pub url: String,
    pub regeneration_count: i32,
    pub remaining_attempts: i32,
}

pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    events: Arc<EventBus>,
    training: Arc<dyn TrainingProvider>,
    payments: Arc<dyn PaymentProvider>,
    storage: Arc<dyn ObjectStorage>,
    fetcher: Arc<dyn BlobFetcher>,
    mailer: Option<Arc<dyn Mailer>>,
    driver: GenerationDriver,
    config: OrchestratorConfig,
}

impl JobOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        generation: GenerationConfig,
        config: OrchestratorConfig,
    ) -> Self {
        let Collaborators {
            store,
            queue,
            events,
            training,
            inference,
            payments,
            storage,
            fetcher,
            mailer,
        } = collaborators;
        let normalizer = OutputNormalizer::new(Arc::clone(&storage), Arc::clone(&fetcher));
        Self {
            store,
            queue,
            events,
            training,
            payments,
            storage,
            fetcher,
            mailer,
            driver: GenerationDriver::new(inference, normalizer, generation),
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Create a job in `uploading`.
    ///
    /// Rejects a second submission from the same identity inside the dedup
    /// window with [`CoreError::DuplicateJob`].
    pub async fn create(&self, submitter: &str, photo_count: usize) -> Result<Job, CoreError> {
        let submitter = normalize_submitter(submitter)?;
        let photo_count = validate_photo_count(photo_count)?;

        let since = dedup::window_start(Utc::now());
        let recent = self
            .store
            .find_recent_by_submitter(&submitter, since, None)
            .await?;
        dedup::ensure_no_recent(recent.as_ref())?;

        let job = self.store.create(NewJob { submitter, photo_count }).await?;
        tracing::info!(job_id = %job.id, photo_count, "Job created");
        Ok(job)
    }

    pub async fn get_status(&self, job_id: JobId) -> Result<JobStatusView, CoreError> {
        Ok(self.load(job_id).await?.into())
    }

    /// Package the uploaded photos and submit them for training.
    ///
    /// Calling this again once the job has left `uploading` returns the job
    /// unchanged, carrying its existing training reference.
    pub async fn start_training(
        &self,
        job_id: JobId,
        photo_urls: &[String],
    ) -> Result<Job, CoreError> {
        let job = self.load(job_id).await?;
        match job.status {
            JobStatus::Uploading => {}
            JobStatus::Failed => {
                return Err(CoreError::Conflict(format!("Job {job_id} has failed")));
            }
            _ => return Ok(job),
        }

        validate_photo_count(photo_urls.len())?;
        let since = dedup::window_start(Utc::now());
        let recent = self
            .store
            .find_recent_by_submitter(&job.submitter, since, Some(job.id))
            .await?;
        dedup::ensure_no_recent(recent.as_ref())?;

        let photos: Vec<(String, bytes::Bytes)> = futures::stream::iter(photo_urls.iter().cloned())
            .map(|url: String| async move {
                let bytes = self.fetcher.fetch(&url).await?;
                Ok::<_, CoreError>((url, bytes))
            })
            .buffered(PHOTO_FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        let zip = archive::build(&photos)?;
        let path = archive::archive_path(job.id);
        self.storage.put(&path, zip, "application/zip").await?;

        let training_ref = self
            .training
            .submit(&TrainingRequest {
                job_id: job.id,
                images_url: self.storage.public_url(&path),
                trigger_token: TRIGGER_TOKEN.to_string(),
                webhook_url: self.config.training_webhook_url.clone(),
            })
            .await?;

        let update = JobUpdate::transition(JobStatus::Training).with_training_ref(&training_ref);
        match self.store.apply(job.id, update).await? {
            Some(job) => {
                tracing::info!(job_id = %job.id, training_ref = %training_ref, "Training started");
                self.publish(event_types::TRAINING_STARTED, &job, serde_json::json!({
                    "training_ref": training_ref,
                }));
                Ok(job)
            }
            None => {
                tracing::warn!(
                    job_id = %job.id,
                    training_ref = %training_ref,
                    "Job left uploading while training was submitted"
                );
                self.load(job.id).await
            }
        }
    }

    // -----------------------------------------------------------------------
    // Webhooks
    // -----------------------------------------------------------------------

    /// Apply a training provider result.
    pub async fn on_training_webhook(
        &self,
        training_ref: &str,
        outcome: TrainingOutcome,
    ) -> Result<WebhookAck, CoreError> {
        let Some(job) = self.store.find_by_training_ref(training_ref).await? else {
            tracing::warn!(training_ref, "Training webhook matches no job");
            return Ok(WebhookAck::Unmatched);
        };

        match outcome {
            TrainingOutcome::InProgress => Ok(WebhookAck::Ignored),
            TrainingOutcome::Succeeded { model_ref } => {
                let update =
                    JobUpdate::transition(JobStatus::GeneratingFree).with_model_ref(&model_ref);
                match self.store.apply(job.id, update).await? {
                    Some(job) => {
                        self.queue.enqueue(job.id, TaskKind::GenerateFree).await?;
                        tracing::info!(job_id = %job.id, model_ref = %model_ref, "Training succeeded");
                        Ok(WebhookAck::Applied)
                    }
                    None => {
                        // Re-enqueue in case the first delivery stopped before queuing.
                        if job.status == JobStatus::GeneratingFree {
                            self.queue.enqueue(job.id, TaskKind::GenerateFree).await?;
                        }
                        tracing::warn!(job_id = %job.id, status = %job.status, "Duplicate training success");
                        Ok(WebhookAck::Duplicate)
                    }
                }
            }
            TrainingOutcome::Failed { reason } => {
                self.fail_training(job, reason.as_deref().unwrap_or("unknown")).await
            }
            TrainingOutcome::Canceled => self.fail_training(job, "canceled").await,
        }
    }

    async fn fail_training(&self, job: Job, reason: &str) -> Result<WebhookAck, CoreError> {
        let update = JobUpdate {
            status: Some(JobStatus::Failed),
            ..JobUpdate::guarded(&[JobStatus::Uploading, JobStatus::Training])
        }
        .with_error(TRAINING_FAILED_MESSAGE);
        match self.store.apply(job.id, update).await? {
            Some(job) => {
                tracing::info!(job_id = %job.id, reason, "Training failed");
                self.publish(event_types::TRAINING_FAILED, &job, serde_json::json!({}));
                Ok(WebhookAck::Applied)
            }
            None => {
                tracing::warn!(job_id = %job.id, status = %job.status, "Late training failure ignored");
                Ok(WebhookAck::Duplicate)
            }
        }
    }

    /// Apply a confirmed payment.
    ///
    /// Marks the job paid and queues full generation. If the free pack is
    /// still being produced the queued task waits for it.
    pub async fn on_payment_webhook(
        &self,
        session_ref: &str,
        job_id: JobId,
    ) -> Result<WebhookAck, CoreError> {
        let Some(job) = self.store.find_by_id(job_id).await? else {
            tracing::warn!(job_id = %job_id, session_ref, "Payment webhook matches no job");
            return Ok(WebhookAck::Unmatched);
        };

        if job.is_paid {
            if !job.status.is_terminal() {
                self.queue.enqueue(job.id, TaskKind::GenerateFull).await?;
            }
            tracing::warn!(job_id = %job.id, session_ref, "Duplicate payment webhook");
            return Ok(WebhookAck::Duplicate);
        }

        let update = JobUpdate::default()
            .only_if_unpaid()
            .with_paid(Some(session_ref.to_string()));
        let Some(job) = self.store.apply(job.id, update).await? else {
            tracing::warn!(job_id = %job_id, session_ref, "Payment already recorded concurrently");
            return Ok(WebhookAck::Duplicate);
        };
        tracing::info!(job_id = %job.id, session_ref, status = %job.status, "Payment recorded");
        self.publish(event_types::PAYMENT_RECEIVED, &job, serde_json::json!({
            "session_ref": session_ref,
        }));

        if job.status == JobStatus::Failed {
            tracing::error!(job_id = %job.id, "Payment received for a failed job");
            return Ok(WebhookAck::Applied);
        }
        if job.status == JobStatus::CompleteFree {
            let moved = self
                .store
                .apply(job.id, JobUpdate::transition(JobStatus::GeneratingFull))
                .await?;
            if moved.is_none() {
                tracing::warn!(
                    job_id = %job.id,
                    session_ref,
                    "Job left complete_free concurrently, full generation task decides"
                );
            }
        }
        self.queue.enqueue(job.id, TaskKind::GenerateFull).await?;
        Ok(WebhookAck::Applied)
    }

    // -----------------------------------------------------------------------
    // Generation stages
    // -----------------------------------------------------------------------

    /// Run the stage a queued task stands for.
    pub async fn handle_task(&self, task: &PipelineTask) -> Result<TaskOutcome, CoreError> {
        match task.kind {
            TaskKind::GenerateFree => self.run_free_generation(task.job_id).await,
            TaskKind::GenerateFull => self.run_full_generation(task.job_id).await,
        }
    }

    pub async fn run_free_generation(&self, job_id: JobId) -> Result<TaskOutcome, CoreError> {
        let Some(job) = self.store.find_by_id(job_id).await? else {
            tracing::warn!(job_id = %job_id, "Free generation for missing job");
            return Ok(TaskOutcome::Completed);
        };
        if job.status != JobStatus::GeneratingFree {
            tracing::info!(job_id = %job_id, status = %job.status, "Free generation already settled");
            return Ok(TaskOutcome::Completed);
        }

        let model_ref = model_ref(&job)?;
        let outcomes = self
            .driver
            .generate(job.id, model_ref, &missing_styles(&job, Tier::Free))
            .await;
        self.complete_free_generation(job.id, outcomes).await?;
        Ok(TaskOutcome::Completed)
    }

    pub async fn run_full_generation(&self, job_id: JobId) -> Result<TaskOutcome, CoreError> {
        let Some(job) = self.store.find_by_id(job_id).await? else {
            tracing::warn!(job_id = %job_id, "Full generation for missing job");
            return Ok(TaskOutcome::Completed);
        };

        let job = match job.status {
            JobStatus::GeneratingFree if is_stalled(&job) => {
                return Err(CoreError::Conflict(
                    "Free generation was abandoned, full generation cannot start".into(),
                ));
            }
            JobStatus::Uploading | JobStatus::Training | JobStatus::GeneratingFree => {
                tracing::debug!(job_id = %job_id, status = %job.status, "Full generation waiting for free pack");
                return Ok(TaskOutcome::Deferred);
            }
            JobStatus::CompleteFree if !job.is_paid => {
                tracing::warn!(job_id = %job_id, "Full generation queued for unpaid job");
                return Ok(TaskOutcome::Completed);
            }
            JobStatus::CompleteFree => {
                let update = JobUpdate {
                    expect_paid: Some(true),
                    ..JobUpdate::transition(JobStatus::GeneratingFull)
                };
                match self.store.apply(job.id, update).await? {
                    Some(job) => job,
                    None => return Ok(TaskOutcome::Deferred),
                }
            }
            JobStatus::GeneratingFull => job,
            JobStatus::Complete | JobStatus::Failed => return Ok(TaskOutcome::Completed),
        };

        let model_ref = model_ref(&job)?;
        let outcomes = self
            .driver
            .generate(job.id, model_ref, &missing_styles(&job, Tier::Paid))
            .await;
        self.complete_full_generation(job.id, outcomes).await?;
        Ok(TaskOutcome::Completed)
    }

    /// Note on the job that `task` was dead-lettered.
    ///
    /// The status is left alone; only the error detail changes, and only
    /// while the job is still in the stage the task was driving.
    pub async fn on_task_abandoned(&self, task: &PipelineTask) -> Result<Option<Job>, CoreError> {
        let stages: &[JobStatus] = match task.kind {
            TaskKind::GenerateFree => &[JobStatus::GeneratingFree],
            TaskKind::GenerateFull => &[JobStatus::CompleteFree, JobStatus::GeneratingFull],
        };
        let update = JobUpdate::guarded(stages).with_error(GENERATION_STALLED_MESSAGE);
        let applied = self.store.apply(task.job_id, update).await?;
        match &applied {
            Some(job) => {
                tracing::error!(job_id = %job.id, kind = %task.kind, status = %job.status, "Generation abandoned");
                self.publish(event_types::GENERATION_STALLED, job, serde_json::json!({
                    "kind": task.kind.name(),
                }));
            }
            None => tracing::info!(
                job_id = %task.job_id,
                kind = %task.kind,
                "Abandoned task's stage already settled"
            ),
        }
        Ok(applied)
    }

    /// Record the free batch and move the job to `complete_free`.
    ///
    /// Returns `None` when the job had already moved on.
    pub async fn complete_free_generation(
        &self,
        job_id: JobId,
        outcomes: Vec<StyleOutcome>,
    ) -> Result<Option<Job>, CoreError> {
        let (items, note) = settle(Tier::Free, outcomes);
        let applied = self
            .complete_stage(job_id, JobStatus::CompleteFree, items.clone(), note)
            .await?;
        if let Some(job) = &applied {
            self.publish(event_types::FREE_PACK_READY, job, serde_json::json!({
                "items": items,
            }));
        }
        Ok(applied)
    }

    /// Record the paid batch and move the job to `complete`.
    pub async fn complete_full_generation(
        &self,
        job_id: JobId,
        outcomes: Vec<StyleOutcome>,
    ) -> Result<Option<Job>, CoreError> {
        let (items, note) = settle(Tier::Paid, outcomes);
        let applied = self
            .complete_stage(job_id, JobStatus::Complete, items, note)
            .await?;
        if let Some(job) = &applied {
            self.publish(event_types::FULL_PACK_READY, job, serde_json::json!({
                "items": job.items,
            }));
        }
        Ok(applied)
    }

    async fn complete_stage(
        &self,
        job_id: JobId,
        to: JobStatus,
        items: Vec<OutputItem>,
        note: Option<String>,
    ) -> Result<Option<Job>, CoreError> {
        let count = items.len();
        let mut update = JobUpdate::transition(to).with_items(items);
        if let Some(note) = &note {
            update = update.with_error(note.clone());
        }
        let applied = self.store.apply(job_id, update).await?;
        match &applied {
            Some(_) => tracing::info!(
                job_id = %job_id,
                status = %to,
                items = count,
                partial_failure = note.is_some(),
                "Generation stage complete"
            ),
            None => tracing::warn!(
                job_id = %job_id,
                status = %to,
                "Stage result discarded, job already moved on"
            ),
        }
        Ok(applied)
    }

    // -----------------------------------------------------------------------
    // Regeneration and checkout
    // -----------------------------------------------------------------------

    /// Regenerate one existing item.
    pub async fn regenerate(
        &self,
        job_id: JobId,
        style_id: &str,
    ) -> Result<RegenerateResult, CoreError> {
        let job = self.load(job_id).await?;
        let style = styles::find(style_id).ok_or_else(|| CoreError::NotFound {
            entity: "Style",
            id: style_id.to_string(),
        })?;
        let item = job.item(style_id).ok_or_else(|| CoreError::NotFound {
            entity: "OutputItem",
            id: style_id.to_string(),
        })?;
        if item.tier == Tier::Paid && !job.is_paid {
            return Err(CoreError::Forbidden(format!(
                "'{style_id}' is part of the paid pack"
            )));
        }
        let next = quota::check_regeneration(item)?;
        let model_ref = model_ref(&job)?;

        let url = self
            .driver
            .generate_one(job.id, model_ref, style)
            .await
            .map_err(|e| {
                tracing::error!(job_id = %job_id, style_id, error = %e, "Regeneration failed");
                e
            })?;

        let replaced = self
            .store
            .replace_item_url(job.id, style_id, &url, item.regeneration_count, next)
            .await?;
        if !replaced {
            return Err(CoreError::Conflict(format!(
                "'{style_id}' was regenerated concurrently"
            )));
        }

        tracing::info!(job_id = %job_id, style_id, regeneration_count = next, "Item regenerated");
        Ok(RegenerateResult {
            url,
            regeneration_count: next,
            remaining_attempts: quota::remaining_attempts(next),
        })
    }

    /// Open a payment session for the paid pack.
    pub async fn create_checkout(&self, job_id: JobId) -> Result<CheckoutSession, CoreError> {
        let job = self.load(job_id).await?;
        if job.is_paid {
            return Err(CoreError::Conflict(format!("Job {job_id} is already paid")));
        }
        if job.status == JobStatus::Failed {
            return Err(CoreError::Conflict(format!("Job {job_id} has failed")));
        }

        let paid_styles = styles::for_tier(Tier::Paid).len();
        let request = CheckoutRequest {
            item: CheckoutItem {
                name: format!("Expressr Full Pack ({} Expressions)", styles::STYLES.len()),
                description: format!("Unlock {paid_styles} additional AI expressions."),
                unit_amount_cents: self.config.price_cents,
                currency: self.config.currency.clone(),
            },
            success_url: format!("{}/success?job_id={job_id}", self.config.app_url),
            cancel_url: templates::view_url(&self.config.app_url, job_id),
            job_id,
            customer_email: Some(job.submitter.clone()),
        };
        let session = self.payments.create_session(&request).await?;

        self.store
            .apply(
                job.id,
                JobUpdate::default()
                    .only_if_unpaid()
                    .with_session_ref(session.id.clone()),
            )
            .await?;
        tracing::info!(job_id = %job_id, session_ref = %session.id, "Checkout session created");
        Ok(session)
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Email the submitter links to all their jobs.
    ///
    /// Returns how many jobs were found. Delivery is best-effort.
    pub async fn recover(&self, email: &str) -> Result<usize, CoreError> {
        let submitter = normalize_submitter(email)?;
        let jobs = self.store.list_by_submitter(&submitter).await?;
        if jobs.is_empty() {
            tracing::info!("Recovery requested for identity with no jobs");
            return Ok(0);
        }

        match &self.mailer {
            Some(mailer) => {
                let email = templates::order_history(&self.config.app_url, &jobs);
                if let Err(e) = mailer.send(&submitter, &email.subject, &email.html).await {
                    tracing::warn!(error = %e, jobs = jobs.len(), "Failed to send recovery email");
                }
            }
            None => tracing::warn!("Recovery email skipped, no mailer configured"),
        }
        Ok(jobs.len())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn load(&self, job_id: JobId) -> Result<Job, CoreError> {
        self.store
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| CoreError::job_not_found(job_id))
    }

    fn publish(&self, event_type: &str, job: &Job, payload: serde_json::Value) {
        self.events.publish(
            PlatformEvent::new(event_type)
                .for_job(job.id, job.submitter.clone())
                .with_payload(payload),
        );
    }
}

fn is_stalled(job: &Job) -> bool {
    job.error_detail.as_deref() == Some(GENERATION_STALLED_MESSAGE)
}

fn model_ref(job: &Job) -> Result<&str, CoreError> {
    job.model_ref
        .as_deref()
        .ok_or_else(|| CoreError::Conflict(format!("Job {} has no trained model yet", job.id)))
}

/// Catalog styles of `tier` the job does not have an item for yet.
fn missing_styles(job: &Job, tier: Tier) -> Vec<StyleDescriptor> {
    styles::for_tier(tier)
        .into_iter()
        .filter(|s| job.item(s.id).is_none())
        .collect()
}

/// Split a batch into stored items and an optional partial-failure note.
fn settle(tier: Tier, outcomes: Vec<StyleOutcome>) -> (Vec<OutputItem>, Option<String>) {
    let total = outcomes.len();
    let mut items = Vec::with_capacity(total);
    let mut failed = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(item) => items.push(item),
            Err(_) => failed.push(outcome.style.id),
        }
    }
    let note = (!failed.is_empty()).then(|| {
        format!(
            "Partial failure: generated {} of {total} {tier} expressions (failed: {})",
            items.len(),
            failed.join(", ")
        )
    });
    (items, note)
}
