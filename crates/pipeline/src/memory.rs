//! In-process [`JobStore`] and [`TaskQueue`].
//!
//! Both honour the same guards as the Postgres implementations (conditional
//! updates, one pending task per job and kind) so pipeline behaviour is
//! identical against either backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use expressr_core::error::CoreError;
use expressr_core::job::{Job, NewJob};
use expressr_core::status::JobStatus;
use expressr_core::store::{JobStore, JobUpdate};
use expressr_core::tasks::{PipelineTask, TaskKind, TaskQueue, LEASE_SECS};
use expressr_core::types::{DbId, JobId, Timestamp};

fn poisoned<T>(_: T) -> CoreError {
    CoreError::Internal("in-memory store lock poisoned".into())
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift a job's creation time into the past.
    pub fn backdate(&self, id: JobId, by: Duration) {
        if let Ok(mut jobs) = self.jobs.lock() {
            if let Some(job) = jobs.get_mut(&id) {
                job.created_at -= by;
            }
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, new: NewJob) -> Result<Job, CoreError> {
        let now = Utc::now();
        let job = Job {
            id: uuid::Uuid::now_v7(),
            submitter: new.submitter,
            status: JobStatus::Uploading,
            photo_count: new.photo_count,
            training_ref: None,
            model_ref: None,
            is_paid: false,
            payment_session_ref: None,
            items: Vec::new(),
            error_detail: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.lock().map_err(poisoned)?.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, CoreError> {
        Ok(self.jobs.lock().map_err(poisoned)?.get(&id).cloned())
    }

    async fn find_by_training_ref(&self, training_ref: &str) -> Result<Option<Job>, CoreError> {
        Ok(self
            .jobs
            .lock()
            .map_err(poisoned)?
            .values()
            .find(|j| j.training_ref.as_deref() == Some(training_ref))
            .cloned())
    }

    async fn find_recent_by_submitter(
        &self,
        submitter: &str,
        since: Timestamp,
        exclude: Option<JobId>,
    ) -> Result<Option<Job>, CoreError> {
        Ok(self
            .jobs
            .lock()
            .map_err(poisoned)?
            .values()
            .filter(|j| j.submitter == submitter && j.created_at >= since)
            .filter(|j| Some(j.id) != exclude)
            .max_by_key(|j| j.created_at)
            .cloned())
    }

    async fn list_by_submitter(&self, submitter: &str) -> Result<Vec<Job>, CoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .map_err(poisoned)?
            .values()
            .filter(|j| j.submitter == submitter)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn apply(&self, id: JobId, update: JobUpdate) -> Result<Option<Job>, CoreError> {
        let mut jobs = self.jobs.lock().map_err(poisoned)?;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(None);
        };
        if !update.matches(job) {
            return Ok(None);
        }

        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(training_ref) = update.training_ref {
            job.training_ref = Some(training_ref);
        }
        if let Some(model_ref) = update.model_ref {
            job.model_ref = Some(model_ref);
        }
        if let Some(is_paid) = update.is_paid {
            job.is_paid = is_paid;
        }
        if let Some(session_ref) = update.payment_session_ref {
            job.payment_session_ref = Some(session_ref);
        }
        if let Some(detail) = update.error_detail {
            job.error_detail = Some(detail);
        }
        for item in update.items {
            if job.item(&item.style_id).is_none() {
                job.items.push(item);
            }
        }
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn replace_item_url(
        &self,
        id: JobId,
        style_id: &str,
        url: &str,
        expected_count: i32,
        new_count: i32,
    ) -> Result<bool, CoreError> {
        let mut jobs = self.jobs.lock().map_err(poisoned)?;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(false);
        };
        match job.items.iter_mut().find(|i| i.style_id == style_id) {
            Some(item) if item.regeneration_count == expected_count => {
                item.url = url.to_string();
                item.regeneration_count = new_count;
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Debug, Clone)]
struct TaskEntry {
    task: PipelineTask,
    locked_until: Option<Timestamp>,
    last_error: Option<String>,
    dead: bool,
}

#[derive(Default)]
struct QueueState {
    next_id: DbId,
    entries: Vec<TaskEntry>,
}

#[derive(Default)]
pub struct InMemoryTaskQueue {
    state: Mutex<QueueState>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (not dead-lettered) tasks as `(job_id, kind, attempts)`.
    pub fn pending(&self) -> Vec<(JobId, TaskKind, i32)> {
        self.state
            .lock()
            .map(|s| {
                s.entries
                    .iter()
                    .filter(|e| !e.dead)
                    .map(|e| (e.task.job_id, e.task.kind, e.task.attempts))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Make every live task due now, skipping backoff and deferral delays.
    pub fn make_all_due(&self) {
        if let Ok(mut state) = self.state.lock() {
            let now = Utc::now();
            for entry in state.entries.iter_mut().filter(|e| !e.dead) {
                entry.task.run_after = entry.task.run_after.min(now);
            }
        }
    }

    /// Dead-lettered tasks as `(job_id, kind, last_error)`.
    pub fn dead_letters(&self) -> Vec<(JobId, TaskKind, Option<String>)> {
        self.state
            .lock()
            .map(|s| {
                s.entries
                    .iter()
                    .filter(|e| e.dead)
                    .map(|e| (e.task.job_id, e.task.kind, e.last_error.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn with_entry(
    state: &mut QueueState,
    task_id: DbId,
    f: impl FnOnce(&mut TaskEntry),
) -> Result<(), CoreError> {
    let entry = state
        .entries
        .iter_mut()
        .find(|e| e.task.id == task_id)
        .ok_or_else(|| CoreError::NotFound {
            entity: "PipelineTask",
            id: task_id.to_string(),
        })?;
    f(entry);
    Ok(())
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, job_id: JobId, kind: TaskKind) -> Result<(), CoreError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        let exists = state
            .entries
            .iter()
            .any(|e| !e.dead && e.task.job_id == job_id && e.task.kind == kind);
        if exists {
            return Ok(());
        }
        state.next_id += 1;
        let task = PipelineTask {
            id: state.next_id,
            job_id,
            kind,
            attempts: 0,
            run_after: Utc::now(),
        };
        state.entries.push(TaskEntry {
            task,
            locked_until: None,
            last_error: None,
            dead: false,
        });
        Ok(())
    }

    async fn claim_next(&self, now: Timestamp) -> Result<Option<PipelineTask>, CoreError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        let next = state
            .entries
            .iter_mut()
            .filter(|e| !e.dead && e.task.run_after <= now)
            .filter(|e| e.locked_until.map_or(true, |until| until <= now))
            .min_by_key(|e| (e.task.run_after, e.task.id));
        Ok(next.map(|entry| {
            entry.locked_until = Some(now + Duration::seconds(LEASE_SECS));
            entry.task.clone()
        }))
    }

    async fn complete(&self, task_id: DbId) -> Result<(), CoreError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        state.entries.retain(|e| e.task.id != task_id);
        Ok(())
    }

    async fn retry(
        &self,
        task_id: DbId,
        run_after: Timestamp,
        error: &str,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        with_entry(&mut state, task_id, |e| {
            e.task.attempts += 1;
            e.task.run_after = run_after;
            e.locked_until = None;
            e.last_error = Some(error.to_string());
        })
    }

    async fn extend_lease(
        &self,
        task_id: DbId,
        locked_until: Timestamp,
    ) -> Result<bool, CoreError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.task.id == task_id && !e.dead && e.locked_until.is_some());
        Ok(match entry {
            Some(entry) => {
                entry.locked_until = Some(locked_until);
                true
            }
            None => false,
        })
    }

    async fn defer(&self, task_id: DbId, run_after: Timestamp) -> Result<(), CoreError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        with_entry(&mut state, task_id, |e| {
            e.task.run_after = run_after;
            e.locked_until = None;
        })
    }

    async fn dead_letter(&self, task_id: DbId, error: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        with_entry(&mut state, task_id, |e| {
            e.dead = true;
            e.locked_until = None;
            e.last_error = Some(error.to_string());
        })
    }
}
