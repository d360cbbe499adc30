//! Replicate client: LoRA training, inference and face detection.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use expressr_core::providers::{
    FaceValidator, InferenceProvider, ProviderError, RawOutput, TrainingOutcome,
    TrainingProvider, TrainingRequest,
};
use expressr_core::styles::InferenceParams;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ReplicateConfig;
use crate::http::{check, join, transport_error};

/// Interval between polls of a prediction that outlived `Prefer: wait`.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Seconds the API may hold a prediction request open.
const PREFER_WAIT_SECS: u32 = 60;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TrainingResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: serde_json::Value,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    num_inference_steps: u32,
    guidance_scale: f32,
    num_outputs: u32,
    aspect_ratio: &'a str,
    output_format: &'a str,
    output_quality: u32,
}

/// Body of a training webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingWebhook {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl TrainingWebhook {
    /// Interpret the delivery.
    ///
    /// A succeeded training without a usable model reference is treated as
    /// failed.
    pub fn outcome(&self) -> TrainingOutcome {
        match self.status.as_str() {
            "succeeded" => match self.model_ref() {
                Some(model_ref) => TrainingOutcome::Succeeded { model_ref },
                None => TrainingOutcome::Failed {
                    reason: Some("training succeeded without a model reference".into()),
                },
            },
            "failed" => TrainingOutcome::Failed {
                reason: self.error.as_ref().map(error_text),
            },
            "canceled" => TrainingOutcome::Canceled,
            _ => TrainingOutcome::InProgress,
        }
    }

    /// `output.version` (a runnable `owner/name:hash`), else `output.weights`.
    fn model_ref(&self) -> Option<String> {
        let output = self.output.as_ref()?;
        ["version", "weights"]
            .iter()
            .find_map(|key| output.get(*key).and_then(|v| v.as_str()))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

fn error_text(value: &serde_json::Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

// ---------------------------------------------------------------------------
// Model references
// ---------------------------------------------------------------------------

/// A runnable model reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelRef<'a> {
    /// `owner/name:version`, a pinned version.
    Pinned { version: &'a str },
    /// `owner/name`, the model's latest version.
    Latest { model: &'a str },
    /// A trained LoRA delivered as a weights URL.
    Weights { url: &'a str },
}

impl<'a> ModelRef<'a> {
    fn parse(raw: &'a str) -> Result<Self, ProviderError> {
        let raw = raw.trim();
        if raw.starts_with("https://") || raw.starts_with("http://") {
            return Ok(Self::Weights { url: raw });
        }

        let invalid = || ProviderError::InvalidModelRef(raw.to_string());
        let (model, version) = match raw.split_once(':') {
            Some((model, version)) => (model, Some(version)),
            None => (raw, None),
        };
        let is_model = model
            .split_once('/')
            .is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'));
        if !is_model {
            return Err(invalid());
        }
        match version {
            Some(version) if version.is_empty() || version.contains('/') => Err(invalid()),
            Some(version) => Ok(Self::Pinned { version }),
            None => Ok(Self::Latest { model }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ReplicateClient {
    client: Client,
    config: ReplicateConfig,
}

impl ReplicateClient {
    pub fn new(client: Client, config: ReplicateConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        join(&self.config.api_url, path)
    }

    /// Create a prediction for `model_ref` and wait for its terminal state.
    ///
    /// Weights URLs run on the configured LoRA base model with the URL
    /// passed as `lora_weights`.
    async fn predict(
        &self,
        model_ref: &str,
        mut input: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let target = match ModelRef::parse(model_ref)? {
            ModelRef::Weights { url } => {
                input["lora_weights"] = json!(url);
                match ModelRef::parse(&self.config.lora_base_model)? {
                    ModelRef::Weights { .. } => {
                        return Err(ProviderError::InvalidModelRef(format!(
                            "LoRA base model '{}' must be a model, not weights",
                            self.config.lora_base_model
                        )))
                    }
                    base => base,
                }
            }
            other => other,
        };

        let (url, body) = match target {
            ModelRef::Pinned { version } => (
                self.url("/v1/predictions"),
                json!({ "version": version, "input": input }),
            ),
            ModelRef::Latest { model } | ModelRef::Weights { url: model } => (
                self.url(&format!("/v1/models/{model}/predictions")),
                json!({ "input": input }),
            ),
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_token)
            .header("Prefer", format!("wait={PREFER_WAIT_SECS}"))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let mut prediction: Prediction = check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        while !prediction.is_terminal() {
            tokio::time::sleep(POLL_INTERVAL).await;
            let response = self
                .client
                .get(self.url(&format!("/v1/predictions/{}", prediction.id)))
                .bearer_auth(&self.config.api_token)
                .send()
                .await
                .map_err(transport_error)?;
            prediction = check(response).await?.json().await.map_err(transport_error)?;
        }

        match prediction.status.as_str() {
            "succeeded" => Ok(prediction.output),
            status => Err(ProviderError::RunFailed(format!(
                "prediction {} {status}: {}",
                prediction.id,
                prediction
                    .error
                    .as_ref()
                    .map(error_text)
                    .unwrap_or_else(|| "no error detail".into())
            ))),
        }
    }
}

#[async_trait]
impl TrainingProvider for ReplicateClient {
    async fn submit(&self, request: &TrainingRequest) -> Result<String, ProviderError> {
        let url = self.url(&format!(
            "/v1/models/{}/versions/{}/trainings",
            self.config.trainer_model, self.config.trainer_version
        ));
        let mut body = json!({
            "destination": self.config.destination,
            "input": {
                "input_images": request.images_url,
                "trigger_word": request.trigger_token,
            },
        });
        if let Some(webhook) = &request.webhook_url {
            body["webhook"] = json!(webhook);
            body["webhook_events_filter"] = json!(["completed"]);
        }

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let training: TrainingResponse = check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        tracing::info!(job_id = %request.job_id, training_id = %training.id, "Training submitted");
        Ok(training.id)
    }
}

#[async_trait]
impl InferenceProvider for ReplicateClient {
    async fn run(
        &self,
        model_ref: &str,
        prompt: &str,
        params: &InferenceParams,
    ) -> Result<RawOutput, ProviderError> {
        let input = PredictionInput {
            prompt,
            num_inference_steps: params.num_inference_steps,
            guidance_scale: params.guidance_scale,
            num_outputs: params.num_outputs,
            aspect_ratio: params.aspect_ratio,
            output_format: params.output_format,
            output_quality: params.output_quality,
        };
        let input = serde_json::to_value(input)
            .map_err(|e| ProviderError::MalformedOutput(e.to_string()))?;
        let output = self.predict(model_ref, input).await?;
        Ok(RawOutput::from_json(output))
    }
}

#[async_trait]
impl FaceValidator for ReplicateClient {
    async fn count_faces(&self, image: Bytes, content_type: &str) -> Result<usize, ProviderError> {
        let data_uri = format!(
            "data:{content_type};base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&image)
        );
        let input = json!({
            "images": data_uri,
            "max_faces": 10,
            "min_confidence": 0.5,
        });
        let output = self.predict(&self.config.face_model, input).await?;
        // The detector answers with one entry per face; anything else is zero.
        Ok(output.as_array().map_or(0, Vec::len))
    }
}
