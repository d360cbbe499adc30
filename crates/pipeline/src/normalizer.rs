//! Output normalization.
//!
//! Every inference result ends up as a URL under owned storage when
//! possible. Provider URLs are downloaded and re-uploaded so results
//! outlive the provider's retention; if the re-upload fails the provider
//! URL is kept verbatim. Streams have no such fallback.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use expressr_core::providers::{BlobFetcher, ByteStream, ObjectStorage, ProviderError, RawOutput};
use futures::StreamExt;

/// Content type of generated images.
pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Clone)]
pub struct OutputNormalizer {
    storage: Arc<dyn ObjectStorage>,
    fetcher: Arc<dyn BlobFetcher>,
}

impl OutputNormalizer {
    pub fn new(storage: Arc<dyn ObjectStorage>, fetcher: Arc<dyn BlobFetcher>) -> Self {
        Self { storage, fetcher }
    }

    /// Resolve `raw` into a canonical URL stored at `path`.
    ///
    /// Lists contribute their first element only. An unrecognized shape or
    /// an empty list is a [`ProviderError::MalformedOutput`].
    pub async fn normalize(&self, raw: RawOutput, path: &str) -> Result<String, ProviderError> {
        let kind = raw.kind();
        match raw {
            RawOutput::UrlList(urls) => match urls.into_iter().next() {
                Some(url) => Ok(self.rehost(url, path).await),
                None => Err(ProviderError::MalformedOutput("empty url list".into())),
            },
            RawOutput::StreamList(streams) => match streams.into_iter().next() {
                Some(stream) => self.store_stream(stream, path).await,
                None => Err(ProviderError::MalformedOutput("empty stream list".into())),
            },
            RawOutput::Url(url) | RawOutput::UrlObject { url } => Ok(self.rehost(url, path).await),
            RawOutput::Stream(stream) => self.store_stream(stream, path).await,
            RawOutput::Unknown(value) => {
                tracing::warn!(kind, output = %truncate(&value.to_string(), 200), "Unrecognized inference output");
                Err(ProviderError::MalformedOutput(format!(
                    "unrecognized output shape: {}",
                    truncate(&value.to_string(), 200)
                )))
            }
        }
    }

    /// Download `url` and re-upload it; fall back to `url` on any failure.
    async fn rehost(&self, url: String, path: &str) -> String {
        let stored = async {
            let bytes = self.fetcher.fetch(&url).await?;
            self.storage.put(path, bytes, IMAGE_CONTENT_TYPE).await
        }
        .await;

        match stored {
            Ok(()) => self.storage.public_url(path),
            Err(e) => {
                tracing::warn!(error = %e, url = %url, path, "Re-upload failed, keeping provider URL");
                url
            }
        }
    }

    async fn store_stream(&self, stream: ByteStream, path: &str) -> Result<String, ProviderError> {
        let bytes = drain(stream).await?;
        if bytes.is_empty() {
            return Err(ProviderError::MalformedOutput("empty output stream".into()));
        }
        self.storage.put(path, bytes, IMAGE_CONTENT_TYPE).await?;
        Ok(self.storage.public_url(path))
    }
}

async fn drain(mut stream: ByteStream) -> Result<Bytes, ProviderError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use expressr_core::providers::bytes_stream;
    use futures::stream;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct MapStorage {
        objects: Mutex<HashMap<String, Bytes>>,
        reject: bool,
    }

    #[async_trait]
    impl ObjectStorage for MapStorage {
        async fn put(&self, path: &str, bytes: Bytes, _ct: &str) -> Result<(), ProviderError> {
            if self.reject {
                return Err(ProviderError::Storage("quota exceeded".into()));
            }
            self.objects.lock().unwrap().insert(path.to_string(), bytes);
            Ok(())
        }

        fn public_url(&self, path: &str) -> String {
            format!("https://store.test/{path}")
        }
    }

    struct MapFetcher(HashMap<String, Bytes>);

    #[async_trait]
    impl BlobFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<Bytes, ProviderError> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| ProviderError::Api { status: 404, body: url.to_string() })
        }
    }

    fn normalizer(storage: Arc<MapStorage>) -> OutputNormalizer {
        let fetcher = MapFetcher(HashMap::from([(
            "https://provider.test/a.jpg".to_string(),
            Bytes::from_static(b"provider-bytes"),
        )]));
        OutputNormalizer::new(storage, Arc::new(fetcher))
    }

    #[tokio::test]
    async fn url_is_rehosted_byte_identical() {
        let storage = Arc::new(MapStorage::default());
        let url = normalizer(storage.clone())
            .normalize(RawOutput::Url("https://provider.test/a.jpg".into()), "j/happy-1.jpg")
            .await
            .unwrap();
        assert_eq!(url, "https://store.test/j/happy-1.jpg");
        assert_eq!(
            storage.objects.lock().unwrap()["j/happy-1.jpg"],
            Bytes::from_static(b"provider-bytes")
        );
    }

    #[tokio::test]
    async fn url_falls_back_verbatim_when_upload_fails() {
        let storage = Arc::new(MapStorage { reject: true, ..Default::default() });
        let url = normalizer(storage)
            .normalize(RawOutput::Url("https://provider.test/a.jpg".into()), "j/happy-1.jpg")
            .await
            .unwrap();
        assert_eq!(url, "https://provider.test/a.jpg");
    }

    #[tokio::test]
    async fn url_falls_back_when_download_fails() {
        let storage = Arc::new(MapStorage::default());
        let url = normalizer(storage.clone())
            .normalize(RawOutput::UrlObject { url: "https://gone.test/x.jpg".into() }, "j/x.jpg")
            .await
            .unwrap();
        assert_eq!(url, "https://gone.test/x.jpg");
        assert!(storage.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn url_list_uses_first_entry() {
        let storage = Arc::new(MapStorage::default());
        let url = normalizer(storage)
            .normalize(
                RawOutput::UrlList(vec![
                    "https://provider.test/a.jpg".into(),
                    "https://provider.test/b.jpg".into(),
                ]),
                "j/sad-1.jpg",
            )
            .await
            .unwrap();
        assert_eq!(url, "https://store.test/j/sad-1.jpg");
    }

    #[tokio::test]
    async fn stream_is_drained_and_stored() {
        let storage = Arc::new(MapStorage::default());
        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
        ]);
        let url = normalizer(storage.clone())
            .normalize(RawOutput::Stream(Box::pin(chunks)), "j/angry-1.jpg")
            .await
            .unwrap();
        assert_eq!(url, "https://store.test/j/angry-1.jpg");
        assert_eq!(
            storage.objects.lock().unwrap()["j/angry-1.jpg"],
            Bytes::from_static(b"abcd")
        );
    }

    #[tokio::test]
    async fn stream_upload_failure_is_an_error() {
        let storage = Arc::new(MapStorage { reject: true, ..Default::default() });
        let result = normalizer(storage)
            .normalize(
                RawOutput::StreamList(vec![bytes_stream(Bytes::from_static(b"img"))]),
                "j/a.jpg",
            )
            .await;
        assert_matches!(result, Err(ProviderError::Storage(_)));
    }

    #[tokio::test]
    async fn unknown_and_empty_shapes_are_malformed() {
        let storage = Arc::new(MapStorage::default());
        let n = normalizer(storage);
        assert_matches!(
            n.normalize(RawOutput::Unknown(json!({"weird": true})), "p").await,
            Err(ProviderError::MalformedOutput(_))
        );
        assert_matches!(
            n.normalize(RawOutput::UrlList(Vec::new()), "p").await,
            Err(ProviderError::MalformedOutput(_))
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
