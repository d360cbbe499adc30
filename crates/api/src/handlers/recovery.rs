use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RecoverRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RecoverResponse {
    pub message: &'static str,
}

const RECOVERY_MESSAGE: &str =
    "If any orders exist for this email, a message with their links is on its way.";

/// POST /api/v1/recover
///
/// Email the submitter their order history. The response never reveals
/// whether any jobs exist for the address.
pub async fn recover(
    State(state): State<AppState>,
    Json(input): Json<RecoverRequest>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.orchestrator.recover(&input.email).await?;
    tracing::debug!(jobs, "Order recovery handled");

    Ok(Json(DataResponse {
        data: RecoverResponse {
            message: RECOVERY_MESSAGE,
        },
    }))
}
