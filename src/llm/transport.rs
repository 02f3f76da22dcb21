//! Transport seam shared by all adapters
//!
//! An adapter owns up to two transports: the vendor's native client library
//! and a raw HTTPS implementation of the same REST call. Both speak the same
//! [`Transport`] trait so the fallback policy lives in one place.

use super::error::ProviderError;
use super::types::{CompletionOptions, LlmRequest, TextResult, TransportKind};
use async_trait::async_trait;
use tracing::{debug, warn};

/// One way of reaching a provider
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &LlmRequest,
        options: &CompletionOptions,
    ) -> Result<TextResult, ProviderError>;

    fn kind(&self) -> TransportKind;
}

/// Sends through the native transport and retries once over HTTP when the
/// native path fails below the content layer.
///
/// Each leg runs under its own `options.timeout`, so a hung SDK call still
/// leaves the HTTP leg a full budget. Content-level failures (bad
/// credentials, throttling, malformed payloads) are returned unchanged: the
/// HTTP path would hit the same wall.
///
/// # Arguments
///
/// * `provider` - Provider name used in log fields
/// * `native` - SDK transport, or `None` for HTTP-only adapters
/// * `http` - Raw HTTP transport, used at most once
pub async fn complete_with_fallback(
    provider: &str,
    native: Option<&dyn Transport>,
    http: &dyn Transport,
    request: &LlmRequest,
    options: &CompletionOptions,
) -> Result<TextResult, ProviderError> {
    let Some(native) = native else {
        return send_within(http, request, options).await;
    };

    match send_within(native, request, options).await {
        Ok(result) => Ok(result),
        Err(e) if e.is_transport() => {
            warn!(
                provider = provider,
                error = %e,
                "Native transport failed, falling back to HTTP"
            );
            let result = send_within(http, request, options).await;
            if result.is_ok() {
                debug!(provider = provider, "HTTP fallback succeeded");
            }
            result
        }
        Err(e) => Err(e),
    }
}

async fn send_within(
    transport: &dyn Transport,
    request: &LlmRequest,
    options: &CompletionOptions,
) -> Result<TextResult, ProviderError> {
    match tokio::time::timeout(options.timeout, transport.send(request, options)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                transport = %transport.kind(),
                timeout_ms = options.timeout.as_millis() as u64,
                "Transport did not answer in time"
            );
            Err(ProviderError::timeout(options.timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedTransport {
        kind: TransportKind,
        outcome: Result<&'static str, ProviderError>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(kind: TransportKind, outcome: Result<&'static str, ProviderError>) -> Self {
            Self {
                kind,
                outcome,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            _request: &LlmRequest,
            _options: &CompletionOptions,
        ) -> Result<TextResult, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
                .clone()
                .map(|text| TextResult::new(text, self.kind, Duration::from_millis(1)))
        }

        fn kind(&self) -> TransportKind {
            self.kind
        }
    }

    fn options() -> CompletionOptions {
        CompletionOptions {
            model: "gpt-4".into(),
            temperature: 0.3,
            max_tokens: 100,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_native_success_skips_http() {
        let native = ScriptedTransport::new(TransportKind::Sdk, Ok("native"));
        let http = ScriptedTransport::new(TransportKind::Http, Ok("http"));

        let result = complete_with_fallback(
            "openai",
            Some(&native),
            &http,
            &LlmRequest::new("hi"),
            &options(),
        )
        .await
        .unwrap();

        assert_eq!(result.text, "native");
        assert_eq!(result.transport, TransportKind::Sdk);
        assert_eq!(http.calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back_once() {
        let native = ScriptedTransport::new(
            TransportKind::Sdk,
            Err(ProviderError::Unavailable {
                message: "connection reset".into(),
            }),
        );
        let http = ScriptedTransport::new(TransportKind::Http, Ok("http"));

        let result = complete_with_fallback(
            "openai",
            Some(&native),
            &http,
            &LlmRequest::new("hi"),
            &options(),
        )
        .await
        .unwrap();

        assert_eq!(result.transport, TransportKind::Http);
        assert_eq!(native.calls(), 1);
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn test_content_failure_does_not_fall_back() {
        let native = ScriptedTransport::new(
            TransportKind::Sdk,
            Err(ProviderError::Authentication {
                message: "401".into(),
            }),
        );
        let http = ScriptedTransport::new(TransportKind::Http, Ok("http"));

        let err = complete_with_fallback(
            "anthropic",
            Some(&native),
            &http,
            &LlmRequest::new("hi"),
            &options(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProviderError::Authentication { .. }));
        assert_eq!(http.calls(), 0);
    }

    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn send(
            &self,
            _request: &LlmRequest,
            _options: &CompletionOptions,
        ) -> Result<TextResult, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(TextResult::new("late", TransportKind::Sdk, Duration::from_secs(30)))
        }

        fn kind(&self) -> TransportKind {
            TransportKind::Sdk
        }
    }

    #[tokio::test]
    async fn test_stalled_native_leg_is_cut_and_falls_back() {
        let http = ScriptedTransport::new(TransportKind::Http, Ok("http"));
        let mut opts = options();
        opts.timeout = Duration::from_millis(50);

        let result = complete_with_fallback(
            "openai",
            Some(&StalledTransport),
            &http,
            &LlmRequest::new("hi"),
            &opts,
        )
        .await
        .unwrap();

        assert_eq!(result.text, "http");
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn test_http_only_when_no_native() {
        let http = ScriptedTransport::new(TransportKind::Http, Ok("http"));
        let result =
            complete_with_fallback("azure", None, &http, &LlmRequest::new("hi"), &options())
                .await
                .unwrap();
        assert_eq!(result.text, "http");
    }
}
