//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                    -> create_job
/// GET    /{id}                -> get_job
/// POST   /{id}/train          -> start_training
/// POST   /{id}/regenerate     -> regenerate
/// POST   /{id}/checkout       -> create_checkout
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::create_job))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/train", post(jobs::start_training))
        .route("/{id}/regenerate", post(jobs::regenerate))
        .route("/{id}/checkout", post(jobs::create_checkout))
}
