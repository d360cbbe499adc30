//! Shared reqwest plumbing.

use std::time::Duration;

use expressr_core::providers::ProviderError;
use reqwest::{Client, Response, StatusCode};

/// Fallback when a 429 carries no usable `retry-after`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Build the shared HTTP client.
///
/// # Panics
///
/// Panics if the TLS backend cannot be initialised (startup only).
pub fn build_client(request_timeout: Duration) -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(request_timeout)
        .build()
        .expect("failed to build HTTP client")
}

/// Map a transport error.
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Request(format!("request timed out: {e}"))
    } else {
        ProviderError::Request(e.to_string())
    }
}

/// Pass through 2xx responses; map everything else to a [`ProviderError`].
pub(crate) async fn check(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_normalises_slashes() {
        assert_eq!(join("https://a.test/", "/v1/x"), "https://a.test/v1/x");
        assert_eq!(join("https://a.test", "v1/x"), "https://a.test/v1/x");
    }
}
