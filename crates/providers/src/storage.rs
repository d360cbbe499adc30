//! Object storage over the Supabase-compatible storage REST API.

use async_trait::async_trait;
use bytes::Bytes;
use expressr_core::providers::{ObjectStorage, ProviderError};
use reqwest::Client;

use crate::config::StorageConfig;
use crate::http::{check, join};

pub struct HttpObjectStorage {
    client: Client,
    config: StorageConfig,
}

impl HttpObjectStorage {
    pub fn new(client: Client, config: StorageConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<(), ProviderError> {
        let url = join(
            &self.config.url,
            &format!("/storage/v1/object/{}/{path}", self.config.bucket),
        );
        let size = bytes.len();
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.service_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| ProviderError::Storage(e.to_string()))?;
        check(response).await.map_err(|e| match e {
            ProviderError::Api { status, body } => {
                ProviderError::Storage(format!("upload rejected ({status}): {body}"))
            }
            other => other,
        })?;
        tracing::debug!(path, size, "Object stored");
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        join(
            &self.config.url,
            &format!("/storage/v1/object/public/{}/{path}", self.config.bucket),
        )
    }
}
