//! External collaborator contracts.
//!
//! Every provider is an injected, stateless handle so the pipeline can be
//! exercised against scripted fakes. Concrete HTTP implementations live in
//! `expressr-providers`.

use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures::stream::{self, BoxStream};

use crate::styles::InferenceParams;
use crate::types::JobId;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Any collaborator failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level failure (network, DNS, TLS, body read).
    #[error("Provider request failed: {0}")]
    Request(String),

    /// The provider answered with a non-2xx status.
    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The call did not finish within its deadline.
    #[error("Provider call timed out after {0}s")]
    Timeout(u64),

    /// The provider is throttling us.
    #[error("Provider rate limited the request (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    /// The provider answered with a shape we cannot use.
    #[error("Malformed provider output: {0}")]
    MalformedOutput(String),

    /// The provider accepted the call but its run failed or was canceled.
    #[error("Provider run failed: {0}")]
    RunFailed(String),

    /// Object storage rejected an upload.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A model reference the provider cannot run.
    #[error("Invalid model reference: {0}")]
    InvalidModelRef(String),
}

impl ProviderError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) | Self::Timeout(_) | Self::RateLimited { .. } | Self::RunFailed(_) => {
                true
            }
            Self::Api { status, .. } => *status >= 500,
            Self::MalformedOutput(_) | Self::Storage(_) | Self::InvalidModelRef(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Inference output shapes
// ---------------------------------------------------------------------------

/// A binary payload delivered in chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, ProviderError>>;

/// Closed set of shapes an inference provider may answer with.
///
/// Resolved once at the provider boundary; the normalizer matches on it
/// exhaustively.
pub enum RawOutput {
    UrlList(Vec<String>),
    StreamList(Vec<ByteStream>),
    Url(String),
    Stream(ByteStream),
    UrlObject { url: String },
    Unknown(serde_json::Value),
}

impl RawOutput {
    /// Classify a provider JSON `output` value.
    ///
    /// `data:` URIs are decoded into in-memory streams; every other string
    /// is a URL.
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::String(s) => Self::from_string(s),
            Value::Array(items) => {
                if items.is_empty() {
                    return Self::Unknown(Value::Array(items));
                }
                if items.iter().all(|i| i.as_str().is_some_and(is_data_uri)) {
                    let streams = items
                        .into_iter()
                        .filter_map(|i| i.as_str().and_then(decode_data_uri))
                        .map(bytes_stream)
                        .collect();
                    return Self::StreamList(streams);
                }
                if items.iter().all(Value::is_string) {
                    let urls = items
                        .into_iter()
                        .filter_map(|i| i.as_str().map(str::to_string))
                        .collect();
                    return Self::UrlList(urls);
                }
                match items.first().and_then(url_field) {
                    Some(url) => Self::UrlObject { url },
                    None => Self::Unknown(Value::Array(items)),
                }
            }
            Value::Object(_) => match url_field(&value) {
                Some(url) => Self::UrlObject { url },
                None => Self::Unknown(value),
            },
            other => Self::Unknown(other),
        }
    }

    fn from_string(s: String) -> Self {
        if is_data_uri(&s) {
            return match decode_data_uri(&s) {
                Some(bytes) => Self::Stream(bytes_stream(bytes)),
                None => Self::Unknown(serde_json::Value::String(s)),
            };
        }
        Self::Url(s)
    }

    /// Short shape name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UrlList(_) => "url_list",
            Self::StreamList(_) => "stream_list",
            Self::Url(_) => "url",
            Self::Stream(_) => "stream",
            Self::UrlObject { .. } => "url_object",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Debug for RawOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UrlList(urls) => f.debug_tuple("UrlList").field(urls).finish(),
            Self::StreamList(s) => write!(f, "StreamList(<{} streams>)", s.len()),
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Stream(_) => f.write_str("Stream(<stream>)"),
            Self::UrlObject { url } => f.debug_struct("UrlObject").field("url", url).finish(),
            Self::Unknown(v) => f.debug_tuple("Unknown").field(v).finish(),
        }
    }
}

/// Wrap an in-memory payload as a single-chunk stream.
pub fn bytes_stream(bytes: Bytes) -> ByteStream {
    Box::pin(stream::once(async move { Ok(bytes) }))
}

fn url_field(value: &serde_json::Value) -> Option<String> {
    value.get("url").and_then(|u| u.as_str()).map(str::to_string)
}

fn is_data_uri(s: &str) -> bool {
    s.starts_with("data:")
}

fn decode_data_uri(s: &str) -> Option<Bytes> {
    let (meta, data) = s.strip_prefix("data:")?.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .ok()
        .map(Bytes::from)
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Request to fit a personalized model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingRequest {
    pub job_id: JobId,
    /// Public URL of the zipped training photos.
    pub images_url: String,
    pub trigger_token: String,
    /// Where the provider should push the completion webhook.
    pub webhook_url: Option<String>,
}

/// Final state reported by a training webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainingOutcome {
    Succeeded { model_ref: String },
    Failed { reason: Option<String> },
    Canceled,
    /// Intermediate status (`starting`, `processing`); nothing to apply.
    InProgress,
}

#[async_trait]
pub trait TrainingProvider: Send + Sync {
    /// Start a training run and return the provider's training id.
    async fn submit(&self, request: &TrainingRequest) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Render one prompt with the trained model.
    async fn run(
        &self,
        model_ref: &str,
        prompt: &str,
        params: &InferenceParams,
    ) -> Result<RawOutput, ProviderError>;
}

/// Line item sold through checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutItem {
    pub name: String,
    pub description: String,
    pub unit_amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub item: CheckoutItem,
    pub success_url: String,
    pub cancel_url: String,
    pub job_id: JobId,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `path`, overwriting any previous object.
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<(), ProviderError>;

    /// Public URL under which `path` is served.
    fn public_url(&self, path: &str) -> String;
}

/// Downloads remote payloads (provider result URLs, uploaded photos).
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, ProviderError>;
}

/// Best-effort email sender.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait FaceValidator: Send + Sync {
    /// Count the faces visible in `image`.
    async fn count_faces(&self, image: Bytes, content_type: &str) -> Result<usize, ProviderError>;
}
