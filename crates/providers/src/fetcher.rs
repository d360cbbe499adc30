//! Plain HTTP downloads.

use async_trait::async_trait;
use bytes::Bytes;
use expressr_core::providers::{BlobFetcher, ProviderError};
use reqwest::Client;

use crate::http::{check, transport_error};

pub struct HttpBlobFetcher {
    client: Client,
}

impl HttpBlobFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobFetcher for HttpBlobFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, ProviderError> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        check(response)
            .await?
            .bytes()
            .await
            .map_err(transport_error)
    }
}
