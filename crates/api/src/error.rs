use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use expressr_core::error::CoreError;
use expressr_core::providers::ProviderError;
use expressr_core::quota;
use expressr_providers::signature::SignatureError;
use serde_json::{json, Map, Value};

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `expressr_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A webhook whose signature could not be verified.
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::Core(CoreError::Provider(err))
    }
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut extra = Map::new();

        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::DuplicateJob { existing_job_id } => {
                    extra.insert("existing_job_id".into(), json!(existing_job_id));
                    (StatusCode::CONFLICT, "CONFLICT", core.to_string())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::QuotaExceeded { used, .. } => {
                    extra.insert(
                        "remaining_attempts".into(),
                        json!(quota::remaining_attempts(*used)),
                    );
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        "QUOTA_EXCEEDED",
                        core.to_string(),
                    )
                }
                CoreError::Provider(err) => classify_provider_error(err, &mut extra),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InvalidSignature(err) => {
                tracing::warn!(error = %err, "Rejected webhook");
                (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE", err.to_string())
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Value::Object(fields) = &mut body {
            fields.extend(extra);
        }

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a collaborator failure into an HTTP status, error code, and
/// message.
///
/// - Rate limiting maps to 429 and carries `retry_after` (seconds).
/// - Everything else maps to 502; provider bodies are logged, not echoed.
fn classify_provider_error(
    err: &ProviderError,
    extra: &mut Map<String, Value>,
) -> (StatusCode, &'static str, String) {
    match err {
        ProviderError::RateLimited { retry_after_secs } => {
            extra.insert("retry_after".into(), json!(retry_after_secs));
            (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many requests, please try again shortly".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Provider error");
            (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                "An upstream service failed".to_string(),
            )
        }
    }
}
