//! HTTP plumbing shared by the raw REST transports
//!
//! Builds the pooled reqwest client and maps transport and status failures
//! onto [`ProviderError`] the same way for every vendor.

use super::error::ProviderError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

/// Builds the HTTP client used by a REST transport
pub(crate) fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Configuration {
            message: format!("Failed to build HTTP client: {}", e),
        })
}

/// POSTs a JSON body and returns the response text of a 2xx reply
pub(crate) async fn post_json<B: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    headers: &[(&'static str, String)],
    body: &B,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let mut builder = client.post(url).timeout(timeout).json(body);
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }

    debug!(url = url, "Sending HTTP completion request");

    let response = builder
        .send()
        .await
        .map_err(|e| map_send_error(e, url, timeout))?;

    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::Unavailable {
            message: format!("Failed to read response body: {}", e),
        })?;

    if !status.is_success() {
        error!(status = status.as_u16(), "Provider returned error status");
        return Err(status_error(status, &text, retry_after));
    }

    Ok(text)
}

fn map_send_error(e: reqwest::Error, url: &str, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        error!("Request to {} timed out after {:?}", url, timeout);
        ProviderError::timeout(timeout)
    } else if e.is_builder() {
        ProviderError::Configuration {
            message: format!("Invalid request: {}", e),
        }
    } else if e.is_connect() {
        error!("Cannot connect to {}", url);
        ProviderError::Unavailable {
            message: format!("Connection failed: {}", e),
        }
    } else {
        error!("Request error: {}", e);
        ProviderError::Unavailable {
            message: format!("Request failed: {}", e),
        }
    }
}

/// Maps a non-2xx status onto the error taxonomy
pub(crate) fn status_error(
    status: StatusCode,
    body: &str,
    retry_after: Option<u64>,
) -> ProviderError {
    let code = status.as_u16();
    match code {
        401 | 403 => ProviderError::Authentication {
            message: format!("HTTP {}: {}", code, snippet(body)),
        },
        429 => ProviderError::RateLimit { retry_after },
        408 | 504 => ProviderError::Timeout { timeout_ms: 0 },
        500..=599 => ProviderError::Unavailable {
            message: format!("HTTP {}: {}", code, snippet(body)),
        },
        _ => ProviderError::invalid_response(format!("HTTP {}", code), Some(body)),
    }
}

/// Reads a `Retry-After` header given in whole seconds
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn snippet(body: &str) -> String {
    body.chars().take(300).collect()
}
