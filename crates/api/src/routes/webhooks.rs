//! Route definitions for provider callbacks.
//!
//! Both endpoints read the raw body so signatures are verified over the
//! exact bytes the provider signed.

use axum::routing::post;
use axum::Router;

use crate::handlers::webhooks;
use crate::state::AppState;

/// Routes mounted at `/webhooks`.
///
/// ```text
/// POST   /training     -> training_webhook
/// POST   /payment      -> payment_webhook
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/training", post(webhooks::training_webhook))
        .route("/payment", post(webhooks::payment_webhook))
}
