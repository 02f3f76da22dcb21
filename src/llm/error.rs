//! Provider error taxonomy
//!
//! Every adapter, transport and the client itself report failures through
//! [`ProviderError`]. The variants are grouped into retryable and permanent
//! classes so the client's retry loop and the SDK-to-HTTP fallback can make
//! decisions without inspecting provider-specific payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Errors that can occur while talking to an LLM provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderError {
    /// Credentials were rejected (HTTP 401/403)
    Authentication { message: String },

    /// Provider throttled the request, optionally telling us when to retry (seconds)
    RateLimit { retry_after: Option<u64> },

    /// Request did not finish within the allotted time (milliseconds)
    Timeout { timeout_ms: u64 },

    /// Provider answered but the payload could not be used
    InvalidResponse {
        message: String,
        raw_response: Option<String>,
    },

    /// Provider could not be reached or answered with a server error
    Unavailable { message: String },

    /// Adapter could not be built or called with the given settings
    Configuration { message: String },
}

impl ProviderError {
    /// Whether a fresh attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::Unavailable { .. }
        )
    }

    /// Whether the failure happened below the content layer.
    ///
    /// Only these errors trigger the switch from the native SDK transport to
    /// raw HTTP inside an adapter.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout { .. } | ProviderError::Unavailable { .. }
        )
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// Short machine-friendly name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Authentication { .. } => "authentication",
            ProviderError::RateLimit { .. } => "rate_limit",
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::InvalidResponse { .. } => "invalid_response",
            ProviderError::Unavailable { .. } => "unavailable",
            ProviderError::Configuration { .. } => "configuration",
        }
    }

    /// Timeout for the given budget, rounded up to whole milliseconds
    pub fn timeout(budget: Duration) -> Self {
        ProviderError::Timeout {
            timeout_ms: ((budget.as_nanos() + 999_999) / 1_000_000) as u64,
        }
    }

    pub(crate) fn invalid_response(message: impl Into<String>, raw: Option<&str>) -> Self {
        ProviderError::InvalidResponse {
            message: message.into(),
            raw_response: raw.map(|body| truncate_raw(body, 2000)),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Authentication { message } => {
                write!(f, "Authentication failed: {}", message)
            }
            ProviderError::RateLimit { retry_after } => {
                if let Some(seconds) = retry_after {
                    write!(f, "Rate limit exceeded, retry after {} seconds", seconds)
                } else {
                    write!(f, "Rate limit exceeded")
                }
            }
            ProviderError::Timeout { timeout_ms } => {
                write!(f, "Request timed out after {}ms", timeout_ms)
            }
            ProviderError::InvalidResponse { message, .. } => {
                write!(f, "Invalid response from provider: {}", message)
            }
            ProviderError::Unavailable { message } => {
                write!(f, "Provider unavailable: {}", message)
            }
            ProviderError::Configuration { message } => {
                write!(f, "Configuration error: {}", message)
            }
        }
    }
}

impl std::error::Error for ProviderError {}

fn truncate_raw(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        body.to_string()
    } else {
        let head: String = body.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(ProviderError::RateLimit { retry_after: None }.is_retryable());
        assert!(ProviderError::Timeout { timeout_ms: 5000 }.is_retryable());
        assert!(ProviderError::Unavailable {
            message: "503".into()
        }
        .is_retryable());

        assert!(ProviderError::Authentication {
            message: "bad key".into()
        }
        .is_permanent());
        assert!(ProviderError::invalid_response("not json", None).is_permanent());
        assert!(ProviderError::Configuration {
            message: "missing".into()
        }
        .is_permanent());
    }

    #[test]
    fn test_rate_limit_is_not_transport() {
        // A throttled SDK call must not be replayed over HTTP
        assert!(!ProviderError::RateLimit {
            retry_after: Some(3)
        }
        .is_transport());
        assert!(ProviderError::Timeout { timeout_ms: 1000 }.is_transport());
    }

    #[test]
    fn test_display() {
        let err = ProviderError::RateLimit {
            retry_after: Some(30),
        };
        assert_eq!(err.to_string(), "Rate limit exceeded, retry after 30 seconds");

        let err = ProviderError::Timeout { timeout_ms: 60_000 };
        assert_eq!(err.to_string(), "Request timed out after 60000ms");
    }

    #[test]
    fn test_timeout_rounds_up_to_millis() {
        assert_eq!(
            ProviderError::timeout(Duration::from_millis(100)),
            ProviderError::Timeout { timeout_ms: 100 }
        );
        assert_eq!(
            ProviderError::timeout(Duration::from_micros(1500)),
            ProviderError::Timeout { timeout_ms: 2 }
        );
        assert_eq!(
            ProviderError::timeout(Duration::from_nanos(1)),
            ProviderError::Timeout { timeout_ms: 1 }
        );
    }

    #[test]
    fn test_raw_response_is_truncated() {
        let body = "x".repeat(5000);
        match ProviderError::invalid_response("bad", Some(&body)) {
            ProviderError::InvalidResponse { raw_response, .. } => {
                let raw = raw_response.unwrap();
                assert!(raw.ends_with("..."));
                assert_eq!(raw.chars().count(), 2003);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let json = serde_json::to_value(ProviderError::Timeout { timeout_ms: 2000 }).unwrap();
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["timeout_ms"], 2000);
    }
}
