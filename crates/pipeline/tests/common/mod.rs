//! Shared fakes and harness for pipeline integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use expressr_core::job::Job;
use expressr_core::providers::{
    BlobFetcher, CheckoutRequest, CheckoutSession, InferenceProvider, Mailer, ObjectStorage,
    PaymentProvider, ProviderError, RawOutput, TrainingProvider, TrainingRequest,
};
use expressr_core::store::JobStore;
use expressr_core::styles::{self, InferenceParams};
use expressr_core::tasks::{TaskQueue, DEFER_SECS};
use expressr_events::EventBus;
use expressr_pipeline::memory::{InMemoryJobStore, InMemoryTaskQueue};
use expressr_pipeline::{
    Collaborators, GenerationConfig, JobOrchestrator, OrchestratorConfig, TaskOutcome,
};

pub const APP_URL: &str = "https://app.test";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeTraining {
    pub submissions: Mutex<Vec<TrainingRequest>>,
}

#[async_trait]
impl TrainingProvider for FakeTraining {
    async fn submit(&self, request: &TrainingRequest) -> Result<String, ProviderError> {
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(request.clone());
        Ok(format!("tr_{}", submissions.len()))
    }
}

/// Returns one provider URL per style; styles listed in `failing` error.
#[derive(Default)]
pub struct FakeInference {
    pub failing: Mutex<HashSet<&'static str>>,
    pub calls: AtomicUsize,
}

impl FakeInference {
    pub fn fail(&self, style_id: &'static str) {
        self.failing.lock().unwrap().insert(style_id);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceProvider for FakeInference {
    async fn run(
        &self,
        _model_ref: &str,
        prompt: &str,
        _params: &InferenceParams,
    ) -> Result<RawOutput, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let style = styles::STYLES
            .iter()
            .find(|s| s.prompt == prompt)
            .map(|s| s.id)
            .unwrap_or("unknown");
        if self.failing.lock().unwrap().contains(style) {
            return Err(ProviderError::RunFailed(format!("{style} rejected")));
        }
        Ok(RawOutput::UrlList(vec![provider_url(style, n)]))
    }
}

pub fn provider_url(style_id: &str, n: usize) -> String {
    format!("https://provider.test/{style_id}-{n}.jpg")
}

#[derive(Default)]
pub struct FakePayments {
    pub requests: Mutex<Vec<CheckoutRequest>>,
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        let id = format!("cs_{}", requests.len());
        Ok(CheckoutSession {
            url: format!("https://pay.test/{id}"),
            id,
        })
    }
}

#[derive(Default)]
pub struct MemStorage {
    pub objects: Mutex<HashMap<String, Bytes>>,
    pub reject: AtomicBool,
}

impl MemStorage {
    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    /// Bytes behind a public URL produced by this storage.
    pub fn resolve(&self, url: &str) -> Option<Bytes> {
        url.strip_prefix("https://store.test/").and_then(|p| self.get(p))
    }
}

#[async_trait]
impl ObjectStorage for MemStorage {
    async fn put(&self, path: &str, bytes: Bytes, _content_type: &str) -> Result<(), ProviderError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(ProviderError::Storage("bucket unavailable".into()));
        }
        self.objects.lock().unwrap().insert(path.to_string(), bytes);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://store.test/{path}")
    }
}

/// Serves `content of <url>` for every URL.
pub struct FakeFetcher;

pub fn content_of(url: &str) -> Bytes {
    Bytes::from(format!("content of {url}"))
}

#[async_trait]
impl BlobFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, ProviderError> {
        Ok(content_of(url))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), ProviderError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.into(), subject.into(), html.into()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub orchestrator: Arc<JobOrchestrator>,
    pub store: Arc<InMemoryJobStore>,
    pub queue: Arc<InMemoryTaskQueue>,
    pub events: Arc<EventBus>,
    pub training: Arc<FakeTraining>,
    pub inference: Arc<FakeInference>,
    pub payments: Arc<FakePayments>,
    pub storage: Arc<MemStorage>,
    pub mailer: Arc<RecordingMailer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::over(|store| store as Arc<dyn JobStore>)
    }

    /// Harness whose orchestrator writes through `wrap(store)`.
    pub fn over(wrap: impl FnOnce(Arc<InMemoryJobStore>) -> Arc<dyn JobStore>) -> Self {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let events = Arc::new(EventBus::default());
        let training = Arc::new(FakeTraining::default());
        let inference = Arc::new(FakeInference::default());
        let payments = Arc::new(FakePayments::default());
        let storage = Arc::new(MemStorage::default());
        let mailer = Arc::new(RecordingMailer::default());

        let collaborators = Collaborators {
            store: wrap(store.clone()),
            queue: queue.clone(),
            events: events.clone(),
            training: training.clone(),
            inference: inference.clone(),
            payments: payments.clone(),
            storage: storage.clone(),
            fetcher: Arc::new(FakeFetcher),
            mailer: Some(mailer.clone()),
        };
        let orchestrator = Arc::new(JobOrchestrator::new(
            collaborators,
            GenerationConfig::immediate(),
            OrchestratorConfig::new(APP_URL, 999),
        ));

        Self {
            orchestrator,
            store,
            queue,
            events,
            training,
            inference,
            payments,
            storage,
            mailer,
        }
    }

    /// Create a job and start its training.
    pub async fn training_job(&self, email: &str) -> Job {
        let job = self.orchestrator.create(email, 12).await.unwrap();
        self.orchestrator
            .start_training(job.id, &photo_urls(12))
            .await
            .unwrap()
    }

    /// A job whose free pack has been generated.
    pub async fn free_complete_job(&self, email: &str) -> Job {
        let job = self.training_job(email).await;
        let training_ref = job.training_ref.clone().unwrap();
        self.orchestrator
            .on_training_webhook(&training_ref, succeeded("me/face:v1"))
            .await
            .unwrap();
        self.drain().await;
        self.job(job.id).await
    }

    pub async fn job(&self, id: expressr_core::types::JobId) -> Job {
        self.store.find_by_id(id).await.unwrap().unwrap()
    }

    /// Run every currently due task once, the way the worker would.
    pub async fn drain(&self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::new();
        let now = Utc::now();
        while let Some(task) = self.queue.claim_next(now).await.unwrap() {
            let outcome = match self.orchestrator.handle_task(&task).await {
                Ok(outcome) => outcome,
                Err(e) => panic!("task {} failed: {e}", task.kind),
            };
            match outcome {
                TaskOutcome::Completed => self.queue.complete(task.id).await.unwrap(),
                TaskOutcome::Deferred => {
                    let later = now + Duration::seconds(DEFER_SECS);
                    self.queue.defer(task.id, later).await.unwrap();
                }
            }
            outcomes.push(outcome);
        }
        outcomes
    }
}

pub fn photo_urls(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("https://uploads.test/p{i}.jpg")).collect()
}

pub fn succeeded(model_ref: &str) -> expressr_core::providers::TrainingOutcome {
    expressr_core::providers::TrainingOutcome::Succeeded {
        model_ref: model_ref.to_string(),
    }
}
