//! Provider callbacks.
//!
//! Both handlers verify the signature over the raw body before parsing it,
//! then hand the outcome to the orchestrator. Deliveries that match no job
//! or carry an uninteresting event are still acknowledged with 200 so the
//! provider stops retrying; only verification failures and internal errors
//! are reported as errors.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use expressr_providers::replicate::TrainingWebhook;
use expressr_providers::signature::{self, SignatureError, WebhookHeaders};
use expressr_providers::stripe::WebhookEvent;

use crate::error::{AppError, AppResult};
use crate::response::WebhookReceived;
use crate::state::AppState;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";
pub const WEBHOOK_ID_HEADER: &str = "webhook-id";
pub const WEBHOOK_TIMESTAMP_HEADER: &str = "webhook-timestamp";
pub const WEBHOOK_SIGNATURE_HEADER: &str = "webhook-signature";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(SignatureError::MalformedHeader)
}

/// POST /api/v1/webhooks/training
pub async fn training_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    if let Some(secret) = state.webhooks.training.as_deref() {
        let signed = WebhookHeaders {
            id: header(&headers, WEBHOOK_ID_HEADER)?,
            timestamp: header(&headers, WEBHOOK_TIMESTAMP_HEADER)?,
            signature: header(&headers, WEBHOOK_SIGNATURE_HEADER)?,
        };
        signature::verify_standard(secret, signed, &body, Utc::now().timestamp())?;
    }

    let payload: TrainingWebhook = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid training webhook body: {e}")))?;

    let ack = state
        .orchestrator
        .on_training_webhook(&payload.id, payload.outcome())
        .await?;
    tracing::info!(training_ref = %payload.id, status = %payload.status, ?ack, "Training webhook handled");

    Ok(Json(WebhookReceived::ok()))
}

/// POST /api/v1/webhooks/payment
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let signature_header = header(&headers, STRIPE_SIGNATURE_HEADER)?;
    signature::verify_stripe(
        &state.webhooks.payment,
        signature_header,
        &body,
        Utc::now().timestamp(),
    )?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid payment webhook body: {e}")))?;

    let Some(checkout) = event.completed_checkout() else {
        tracing::debug!(event_type = %event.event_type, "Ignoring payment event");
        return Ok(Json(WebhookReceived::ok()));
    };
    let Some(job_id) = checkout.job_id else {
        tracing::warn!(session_ref = %checkout.session_id, "Completed checkout without a job id");
        return Ok(Json(WebhookReceived::ok()));
    };

    let ack = state
        .orchestrator
        .on_payment_webhook(&checkout.session_id, job_id)
        .await?;
    tracing::info!(job_id = %job_id, session_ref = %checkout.session_id, ?ack, "Payment webhook handled");

    Ok(Json(WebhookReceived::ok()))
}
