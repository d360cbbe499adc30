//! Single-face pre-check for training uploads.

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

const IMAGE_FIELD: &str = "image";

#[derive(Debug, Serialize)]
pub struct FaceValidation {
    pub is_valid: bool,
    pub face_count: usize,
    pub error: Option<&'static str>,
}

impl FaceValidation {
    pub fn from_count(face_count: usize) -> Self {
        let error = match face_count {
            0 => Some("No face detected"),
            1 => None,
            _ => Some("Multiple faces detected"),
        };
        Self {
            is_valid: face_count == 1,
            face_count,
            error,
        }
    }
}

/// POST /api/v1/validate-face
///
/// Accepts a multipart upload with an `image` field and reports whether it
/// shows exactly one face.
pub async fn validate_face(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let content_type = field.content_type().unwrap_or("image/jpeg").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        if data.is_empty() {
            return Err(AppError::BadRequest("image is empty".into()));
        }

        let face_count = state.faces.count_faces(data, &content_type).await?;
        tracing::debug!(face_count, "Face validation finished");

        return Ok(Json(DataResponse {
            data: FaceValidation::from_count(face_count),
        }));
    }

    Err(AppError::BadRequest(format!(
        "multipart field '{IMAGE_FIELD}' is required"
    )))
}
