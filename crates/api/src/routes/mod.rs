pub mod health;
pub mod jobs;
pub mod webhooks;

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Largest accepted face-validation upload.
const FACE_UPLOAD_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                                 create
/// /jobs/{id}                            status
/// /jobs/{id}/train                      start training
/// /jobs/{id}/regenerate                 regenerate one expression
/// /jobs/{id}/checkout                   create checkout session
///
/// /webhooks/training                    training provider callback
/// /webhooks/payment                     payment provider callback
///
/// /recover                              email order history
/// /validate-face                        single-face pre-check (multipart)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/webhooks", webhooks::router())
        .route("/recover", post(handlers::recovery::recover))
        .route(
            "/validate-face",
            post(handlers::faces::validate_face)
                .layer(DefaultBodyLimit::max(FACE_UPLOAD_LIMIT_BYTES)),
        )
}
