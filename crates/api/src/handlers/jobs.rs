//! Handlers for the `/jobs` resource.
//!
//! Every operation is delegated to the [`JobOrchestrator`]; handlers only
//! translate between HTTP and the domain.
//!
//! [`JobOrchestrator`]: expressr_pipeline::JobOrchestrator

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use expressr_core::types::JobId;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub email: String,
    pub photo_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct StartTrainingRequest {
    /// Public URLs of the uploaded training photos.
    pub photo_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    pub style_id: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Create / status
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Create a job in `uploading`. Returns 201 with the job, or 409 with
/// `existing_job_id` when the same email submitted within the dedup window.
pub async fn create_job(
    State(state): State<AppState>,
    Json(input): Json<CreateJobRequest>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .orchestrator
        .create(&input.email, input.photo_count)
        .await?;

    tracing::info!(job_id = %job.id, photo_count = job.photo_count, "Job created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let view = state.orchestrator.get_status(job_id).await?;
    Ok(Json(DataResponse { data: view }))
}

// ---------------------------------------------------------------------------
// Training
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/train
///
/// Package the uploaded photos and start training. Idempotent once the job
/// has left `uploading`.
pub async fn start_training(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(input): Json<StartTrainingRequest>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .orchestrator
        .start_training(job_id, &input.photo_urls)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// Regenerate / checkout
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/regenerate
///
/// Re-render one expression. 429 with `remaining_attempts: 0` once the
/// per-item cap is reached.
pub async fn regenerate(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(input): Json<RegenerateRequest>,
) -> AppResult<impl IntoResponse> {
    let result = state
        .orchestrator
        .regenerate(job_id, &input.style_id)
        .await?;

    tracing::info!(
        job_id = %job_id,
        style_id = %input.style_id,
        regeneration_count = result.regeneration_count,
        "Expression regenerated",
    );

    Ok(Json(DataResponse { data: result }))
}

/// POST /api/v1/jobs/{id}/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let session = state.orchestrator.create_checkout(job_id).await?;
    Ok(Json(DataResponse {
        data: CheckoutResponse {
            session_id: session.id,
            url: session.url,
        },
    }))
}
