//! Stripe checkout client and webhook event parsing.

use async_trait::async_trait;
use expressr_core::providers::{CheckoutRequest, CheckoutSession, PaymentProvider, ProviderError};
use expressr_core::types::JobId;
use reqwest::Client;
use serde::Deserialize;

use crate::config::StripeConfig;
use crate::http::{check, join, transport_error};
use crate::signature::{self, SignatureError};

/// The only webhook event type that changes job state.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(client: Client, config: StripeConfig) -> Self {
        Self { client, config }
    }

    /// Verify a webhook body against its `Stripe-Signature` header.
    pub fn verify_webhook(&self, header: &str, body: &[u8]) -> Result<(), SignatureError> {
        signature::verify_stripe(
            &self.config.webhook_secret,
            header,
            body,
            chrono::Utc::now().timestamp(),
        )
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
fn session_form(request: &CheckoutRequest) -> Vec<(&'static str, String)> {
    let job_id = request.job_id.to_string();
    let mut form = vec![
        ("mode", "payment".to_string()),
        ("success_url", request.success_url.clone()),
        ("cancel_url", request.cancel_url.clone()),
        ("client_reference_id", job_id.clone()),
        ("metadata[job_id]", job_id),
        ("line_items[0][quantity]", "1".to_string()),
        ("line_items[0][price_data][currency]", request.item.currency.clone()),
        (
            "line_items[0][price_data][unit_amount]",
            request.item.unit_amount_cents.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]",
            request.item.name.clone(),
        ),
        (
            "line_items[0][price_data][product_data][description]",
            request.item.description.clone(),
        ),
    ];
    if let Some(email) = &request.customer_email {
        form.push(("customer_email", email.clone()));
    }
    form
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let response = self
            .client
            .post(join(&self.config.api_url, "/v1/checkout/sessions"))
            .bearer_auth(&self.config.secret_key)
            .form(&session_form(request))
            .send()
            .await
            .map_err(transport_error)?;
        let session: SessionResponse = check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        let url = session.url.ok_or_else(|| {
            ProviderError::MalformedOutput(format!("checkout session {} has no url", session.id))
        })?;
        tracing::info!(job_id = %request.job_id, session_id = %session.id, "Checkout session created");
        Ok(CheckoutSession { id: session.id, url })
    }
}

// ---------------------------------------------------------------------------
// Webhook events
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: SessionObject,
}

#[derive(Debug, Deserialize)]
pub struct SessionObject {
    pub id: String,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A completed checkout, ready to be applied to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCheckout {
    pub session_id: String,
    pub job_id: Option<JobId>,
}

impl WebhookEvent {
    /// `Some` only for completed checkouts.
    ///
    /// The job id comes from `metadata.job_id`, falling back to
    /// `client_reference_id`.
    pub fn completed_checkout(&self) -> Option<CompletedCheckout> {
        if self.event_type != CHECKOUT_COMPLETED {
            return None;
        }
        let object = &self.data.object;
        let from_metadata = object
            .metadata
            .as_ref()
            .and_then(|m| m.get("job_id"))
            .and_then(|v| v.as_str());
        let job_id = from_metadata
            .or(object.client_reference_id.as_deref())
            .and_then(|s| s.parse().ok());
        Some(CompletedCheckout {
            session_id: object.id.clone(),
            job_id,
        })
    }
}
