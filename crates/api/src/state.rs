use std::sync::Arc;

use expressr_core::providers::FaceValidator;
use expressr_pipeline::JobOrchestrator;

use crate::config::ServerConfig;

/// Shared secrets used to authenticate inbound webhooks.
#[derive(Debug, Clone)]
pub struct WebhookSecrets {
    /// Stripe endpoint secret (`whsec_...`), always required.
    pub payment: String,
    /// Replicate signing secret. `None` disables training webhook
    /// verification.
    pub training: Option<String>,
}

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (health reporting only; jobs go through the
    /// orchestrator's store).
    pub pool: expressr_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job lifecycle entry point.
    pub orchestrator: Arc<JobOrchestrator>,
    /// Face detection for the upload pre-check.
    pub faces: Arc<dyn FaceValidator>,
    pub webhooks: Arc<WebhookSecrets>,
}
