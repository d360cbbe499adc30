//! Generation driver.
//!
//! Calls the inference provider once per style and normalizes each result.
//! One style failing never aborts the batch: every attempted style comes
//! back as a [`StyleOutcome`] carrying either the stored item or the error.

use std::sync::Arc;
use std::time::Duration;

use expressr_core::job::OutputItem;
use expressr_core::providers::{InferenceProvider, ProviderError};
use expressr_core::styles::{InferenceParams, StyleDescriptor};
use expressr_core::types::JobId;
use futures::StreamExt;

use crate::normalizer::OutputNormalizer;

/// Upper bound on parallel inference calls within one batch.
pub const MAX_CONCURRENCY: usize = 4;

/// Longest pause honoured for a provider `retry-after`.
const MAX_RATE_LIMIT_WAIT_SECS: u64 = 60;

/// Pacing, timeout and retry settings for inference calls.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Pause between consecutive calls in sequential mode.
    pub inter_call_delay: Duration,
    /// Bound on a single inference call.
    pub call_timeout: Duration,
    /// Parallel calls per batch; 1 means sequential.
    pub concurrency: usize,
    /// Retries of a transient failure before the style is given up.
    pub max_retries: u32,
    /// First backoff step between retries, doubled each time.
    pub retry_base: Duration,
}

impl GenerationConfig {
    /// Load from environment variables.
    ///
    /// | Env var                          | Default |
    /// |----------------------------------|---------|
    /// | `GENERATION_INTER_CALL_DELAY_MS` | `12000` |
    /// | `GENERATION_CALL_TIMEOUT_SECS`   | `120`   |
    /// | `GENERATION_CONCURRENCY`         | `1`     |
    /// | `GENERATION_MAX_RETRIES`         | `2`     |
    pub fn from_env() -> Self {
        let delay_ms: u64 = std::env::var("GENERATION_INTER_CALL_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(12_000);
        let timeout_secs: u64 = std::env::var("GENERATION_CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);
        let concurrency: usize = std::env::var("GENERATION_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let max_retries: u32 = std::env::var("GENERATION_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2);

        Self {
            inter_call_delay: Duration::from_millis(delay_ms),
            call_timeout: Duration::from_secs(timeout_secs),
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            max_retries,
            retry_base: Duration::from_secs(2),
        }
    }

    /// No pacing and no backoff waits.
    pub fn immediate() -> Self {
        Self {
            inter_call_delay: Duration::ZERO,
            call_timeout: Duration::from_secs(120),
            concurrency: 1,
            max_retries: 0,
            retry_base: Duration::ZERO,
        }
    }

    fn backoff(&self, attempt: u32, error: &ProviderError) -> Duration {
        match error {
            ProviderError::RateLimited { retry_after_secs } => {
                Duration::from_secs((*retry_after_secs).min(MAX_RATE_LIMIT_WAIT_SECS))
            }
            _ => self.retry_base * 2u32.saturating_pow(attempt),
        }
    }
}

/// Result of generating one style.
#[derive(Debug)]
pub struct StyleOutcome {
    pub style: StyleDescriptor,
    pub result: Result<OutputItem, ProviderError>,
}

pub struct GenerationDriver {
    inference: Arc<dyn InferenceProvider>,
    normalizer: OutputNormalizer,
    params: InferenceParams,
    config: GenerationConfig,
}

impl GenerationDriver {
    pub fn new(
        inference: Arc<dyn InferenceProvider>,
        normalizer: OutputNormalizer,
        config: GenerationConfig,
    ) -> Self {
        Self {
            inference,
            normalizer,
            params: InferenceParams::default(),
            config,
        }
    }

    /// Generate every style in `styles`, preserving their order.
    pub async fn generate(
        &self,
        job_id: JobId,
        model_ref: &str,
        styles: &[StyleDescriptor],
    ) -> Vec<StyleOutcome> {
        tracing::info!(
            job_id = %job_id,
            styles = styles.len(),
            concurrency = self.config.concurrency,
            "Generation batch started"
        );

        let outcomes: Vec<StyleOutcome> = if self.config.concurrency <= 1 {
            let mut outcomes = Vec::with_capacity(styles.len());
            for (i, style) in styles.iter().enumerate() {
                if i > 0 && !self.config.inter_call_delay.is_zero() {
                    tokio::time::sleep(self.config.inter_call_delay).await;
                }
                outcomes.push(self.outcome(job_id, model_ref, style).await);
            }
            outcomes
        } else {
            let pending: Vec<_> = styles
                .iter()
                .map(|style| self.outcome(job_id, model_ref, style))
                .collect();
            futures::stream::iter(pending)
                .buffered(self.config.concurrency)
                .collect()
                .await
        };

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        tracing::info!(
            job_id = %job_id,
            succeeded = outcomes.len() - failed,
            failed,
            "Generation batch finished"
        );
        outcomes
    }

    /// Generate a single style and return its canonical URL.
    ///
    /// Used by regeneration: no inter-call pacing, errors surface directly.
    pub async fn generate_one(
        &self,
        job_id: JobId,
        model_ref: &str,
        style: &StyleDescriptor,
    ) -> Result<String, ProviderError> {
        self.attempt(job_id, model_ref, style).await
    }

    async fn outcome(&self, job_id: JobId, model_ref: &str, style: &StyleDescriptor) -> StyleOutcome {
        let result = self
            .attempt(job_id, model_ref, style)
            .await
            .map(|url| OutputItem {
                style_id: style.id.to_string(),
                label: style.label.to_string(),
                url,
                tier: style.tier,
                regeneration_count: 0,
            });
        if let Err(e) = &result {
            tracing::warn!(job_id = %job_id, style_id = style.id, error = %e, "Style generation failed");
        }
        StyleOutcome { style: *style, result }
    }

    async fn attempt(
        &self,
        job_id: JobId,
        model_ref: &str,
        style: &StyleDescriptor,
    ) -> Result<String, ProviderError> {
        let mut attempt = 0;
        let raw = loop {
            match self.call(model_ref, style).await {
                Ok(raw) => break raw,
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let wait = self.config.backoff(attempt, &e);
                    tracing::debug!(
                        job_id = %job_id,
                        style_id = style.id,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Retrying inference call"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let path = output_path(job_id, style.id);
        self.normalizer.normalize(raw, &path).await
    }

    async fn call(
        &self,
        model_ref: &str,
        style: &StyleDescriptor,
    ) -> Result<expressr_core::providers::RawOutput, ProviderError> {
        let run = self.inference.run(model_ref, style.prompt, &self.params);
        match tokio::time::timeout(self.config.call_timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.config.call_timeout.as_secs())),
        }
    }
}

/// Storage path of a generated image. Every call yields a fresh,
/// time-ordered name so a regeneration never overwrites an earlier file.
pub fn output_path(job_id: JobId, style_id: &str) -> String {
    format!("{job_id}/{style_id}-{}.jpg", uuid::Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;
    use expressr_core::job::Tier;
    use expressr_core::providers::{BlobFetcher, ObjectStorage, RawOutput};
    use expressr_core::styles;

    use super::*;

    /// Scripted inference: per-style error queue, otherwise a URL.
    #[derive(Default)]
    struct ScriptedInference {
        errors: Mutex<HashMap<&'static str, Vec<ProviderError>>>,
        calls: AtomicUsize,
        hang: bool,
    }

    impl ScriptedInference {
        fn failing(style_id: &'static str, errors: Vec<ProviderError>) -> Self {
            let s = Self::default();
            s.errors.lock().unwrap().insert(style_id, errors);
            s
        }
    }

    #[async_trait]
    impl InferenceProvider for ScriptedInference {
        async fn run(
            &self,
            _model_ref: &str,
            prompt: &str,
            _params: &InferenceParams,
        ) -> Result<RawOutput, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            let style = styles::STYLES
                .iter()
                .find(|s| s.prompt == prompt)
                .map(|s| s.id)
                .unwrap_or("unknown");
            if let Some(queue) = self.errors.lock().unwrap().get_mut(style) {
                if !queue.is_empty() {
                    return Err(queue.remove(0));
                }
            }
            Ok(RawOutput::UrlList(vec![format!("https://provider.test/{style}.jpg")]))
        }
    }

    struct NullStorage;

    #[async_trait]
    impl ObjectStorage for NullStorage {
        async fn put(&self, _: &str, _: Bytes, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }
        fn public_url(&self, path: &str) -> String {
            format!("https://store.test/{path}")
        }
    }

    struct EchoFetcher;

    #[async_trait]
    impl BlobFetcher for EchoFetcher {
        async fn fetch(&self, url: &str) -> Result<Bytes, ProviderError> {
            Ok(Bytes::from(url.to_string()))
        }
    }

    fn driver(inference: Arc<ScriptedInference>, config: GenerationConfig) -> GenerationDriver {
        let normalizer = OutputNormalizer::new(Arc::new(NullStorage), Arc::new(EchoFetcher));
        GenerationDriver::new(inference, normalizer, config)
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_batch() {
        let inference = Arc::new(ScriptedInference::failing(
            "sad",
            vec![ProviderError::RunFailed("nsfw".into())],
        ));
        let outcomes = driver(inference, GenerationConfig::immediate())
            .generate(uuid::Uuid::now_v7(), "m", &styles::for_tier(Tier::Free))
            .await;

        let ids: Vec<_> = outcomes.iter().map(|o| o.style.id).collect();
        assert_eq!(ids, ["happy", "sad", "angry"]);
        assert!(outcomes[0].result.is_ok());
        assert_matches!(outcomes[1].result, Err(ProviderError::RunFailed(_)));
        assert!(outcomes[2].result.is_ok());
    }

    #[tokio::test]
    async fn items_carry_style_metadata_and_stored_url() {
        let job_id = uuid::Uuid::now_v7();
        let outcomes = driver(Arc::new(ScriptedInference::default()), GenerationConfig::immediate())
            .generate(job_id, "m", &styles::for_tier(Tier::Paid)[..1])
            .await;
        let item = outcomes[0].result.as_ref().unwrap();
        assert_eq!(item.style_id, "shocked");
        assert_eq!(item.label, "Shocked");
        assert_eq!(item.tier, Tier::Paid);
        assert_eq!(item.regeneration_count, 0);
        assert!(item.url.starts_with(&format!("https://store.test/{job_id}/shocked-")));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let inference = Arc::new(ScriptedInference::failing(
            "happy",
            vec![
                ProviderError::Api { status: 503, body: "busy".into() },
                ProviderError::RateLimited { retry_after_secs: 0 },
            ],
        ));
        let config = GenerationConfig { max_retries: 2, ..GenerationConfig::immediate() };
        let url = driver(inference.clone(), config)
            .generate_one(uuid::Uuid::now_v7(), "m", &styles::STYLES[0])
            .await
            .unwrap();
        assert!(url.contains("happy-"));
        assert_eq!(inference.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let inference = Arc::new(ScriptedInference::failing(
            "happy",
            vec![ProviderError::Api { status: 422, body: "bad input".into() }],
        ));
        let config = GenerationConfig { max_retries: 2, ..GenerationConfig::immediate() };
        let result = driver(inference.clone(), config)
            .generate_one(uuid::Uuid::now_v7(), "m", &styles::STYLES[0])
            .await;
        assert_matches!(result, Err(ProviderError::Api { status: 422, .. }));
        assert_eq!(inference.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_call_times_out() {
        let inference = Arc::new(ScriptedInference { hang: true, ..Default::default() });
        let config = GenerationConfig {
            call_timeout: Duration::from_secs(5),
            ..GenerationConfig::immediate()
        };
        let result = driver(inference, config)
            .generate_one(uuid::Uuid::now_v7(), "m", &styles::STYLES[0])
            .await;
        assert_eq!(result.unwrap_err(), ProviderError::Timeout(5));
    }

    #[tokio::test]
    async fn bounded_parallel_batch_preserves_order() {
        let config = GenerationConfig { concurrency: 3, ..GenerationConfig::immediate() };
        let paid = styles::for_tier(Tier::Paid);
        let outcomes = driver(Arc::new(ScriptedInference::default()), config)
            .generate(uuid::Uuid::now_v7(), "m", &paid)
            .await;
        let ids: Vec<_> = outcomes.iter().map(|o| o.style.id).collect();
        let expected: Vec<_> = paid.iter().map(|s| s.id).collect();
        assert_eq!(ids, expected);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
    }

    #[test]
    fn output_paths_are_unique_per_call() {
        let job_id = uuid::Uuid::now_v7();
        let a = output_path(job_id, "happy");
        let b = output_path(job_id, "happy");
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("{job_id}/happy-")));
        assert!(a.ends_with(".jpg"));
    }

    #[test]
    fn rate_limit_backoff_uses_retry_after() {
        let config = GenerationConfig::from_env();
        assert_eq!(
            config.backoff(0, &ProviderError::RateLimited { retry_after_secs: 7 }),
            Duration::from_secs(7)
        );
        assert_eq!(
            config.backoff(0, &ProviderError::RateLimited { retry_after_secs: 999 }),
            Duration::from_secs(MAX_RATE_LIMIT_WAIT_SECS)
        );
        assert_eq!(
            config.backoff(2, &ProviderError::Request("reset".into())),
            Duration::from_secs(8)
        );
    }
}
