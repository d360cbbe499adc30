//! Production wiring of the pipeline collaborators.
//!
//! Both binaries build the same orchestrator: Postgres for jobs and tasks,
//! Replicate for training / inference / face detection, Stripe for
//! payments, HTTP object storage, and SMTP when configured.

use std::sync::Arc;
use std::time::Duration;

use expressr_core::providers::Mailer;
use expressr_core::tasks::TaskQueue;
use expressr_db::{DbPool, PgJobStore, PgTaskQueue};
use expressr_events::{EmailConfig, EventBus, NotificationService, SmtpMailer};
use expressr_pipeline::{Collaborators, GenerationConfig, JobOrchestrator, OrchestratorConfig};
use expressr_providers::{
    build_client, HttpBlobFetcher, HttpObjectStorage, ReplicateClient, ReplicateConfig,
    StorageConfig, StripeClient, StripeConfig,
};
use tokio::task::JoinHandle;

/// Per-request bound for outbound provider HTTP calls.
const HTTP_TIMEOUT_SECS: u64 = 90;

/// Everything a binary needs from the pipeline.
pub struct Services {
    pub orchestrator: Arc<JobOrchestrator>,
    pub queue: Arc<dyn TaskQueue>,
    pub replicate: Arc<ReplicateClient>,
    pub replicate_config: ReplicateConfig,
    pub stripe: Arc<StripeClient>,
    pub stripe_config: StripeConfig,
    pub mailer: Option<Arc<dyn Mailer>>,
}

/// Public base URL of the web app.
///
/// | Env Var          | Default                 |
/// |------------------|-------------------------|
/// | `PUBLIC_APP_URL` | `http://localhost:3000` |
pub fn public_app_url() -> String {
    std::env::var("PUBLIC_APP_URL").unwrap_or_else(|_| "http://localhost:3000".into())
}

/// Build the production collaborators and orchestrator.
///
/// # Panics
///
/// Panics when a required provider variable is missing or the SMTP
/// settings are unusable.
pub fn build_services(pool: DbPool, events: Arc<EventBus>, app_url: &str) -> Services {
    let client = build_client(Duration::from_secs(HTTP_TIMEOUT_SECS));

    let replicate_config = ReplicateConfig::from_env();
    let stripe_config = StripeConfig::from_env();
    let storage_config = StorageConfig::from_env();

    let replicate = Arc::new(ReplicateClient::new(client.clone(), replicate_config.clone()));
    let stripe = Arc::new(StripeClient::new(client.clone(), stripe_config.clone()));

    let mailer: Option<Arc<dyn Mailer>> = EmailConfig::from_env().map(|config| {
        let mailer = SmtpMailer::new(&config).expect("SMTP configuration is invalid");
        Arc::new(mailer) as Arc<dyn Mailer>
    });
    if mailer.is_none() {
        tracing::warn!("SMTP_HOST not set, email delivery disabled");
    }

    let queue: Arc<dyn TaskQueue> = Arc::new(PgTaskQueue::new(pool.clone()));
    let collaborators = Collaborators {
        store: Arc::new(PgJobStore::new(pool)),
        queue: Arc::clone(&queue),
        events,
        training: replicate.clone(),
        inference: replicate.clone(),
        payments: stripe.clone(),
        storage: Arc::new(HttpObjectStorage::new(client.clone(), storage_config)),
        fetcher: Arc::new(HttpBlobFetcher::new(client)),
        mailer: mailer.clone(),
    };

    let orchestrator = Arc::new(JobOrchestrator::new(
        collaborators,
        GenerationConfig::from_env(),
        OrchestratorConfig::new(app_url, stripe_config.price_cents),
    ));

    Services {
        orchestrator,
        queue,
        replicate,
        replicate_config,
        stripe,
        stripe_config,
        mailer,
    }
}

/// Spawn the notification service on `events` when a mailer is configured.
pub fn spawn_notifications(
    events: &EventBus,
    mailer: Option<Arc<dyn Mailer>>,
    app_url: &str,
    price_cents: i64,
) -> Option<JoinHandle<()>> {
    let mailer = mailer?;
    let service = NotificationService::new(mailer, app_url, price_cents);
    Some(tokio::spawn(service.run(events.subscribe())))
}
