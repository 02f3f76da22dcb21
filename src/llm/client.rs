//! LLM client: the single entry point the analysis stages call
//!
//! Wraps one [`ProviderAdapter`] with a per-attempt timeout, bounded
//! exponential backoff on retryable failures and normalization of the reply.

use super::error::ProviderError;
use super::factory::create_adapter;
use super::provider::{ProviderAdapter, ProviderConfig};
use super::types::{CompletionOptions, LlmRequest, TextResult};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::new(0)
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `retry` (1-based).
    ///
    /// A provider-supplied `retry_after` raises the delay but never past
    /// `max_delay`.
    pub fn delay_for(&self, retry: u32, error: &ProviderError) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        match error {
            ProviderError::RateLimit {
                retry_after: Some(seconds),
            } => backoff.max(Duration::from_secs(*seconds)).min(self.max_delay),
            _ => backoff,
        }
    }
}

/// Per-call overrides of the configured generation settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AskOverrides {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
}

impl AskOverrides {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Provider-agnostic LLM client
///
/// Cheap to share behind an `Arc`; concurrent `ask` calls do not interfere.
pub struct LlmClient {
    config: ProviderConfig,
    adapter: Arc<dyn ProviderAdapter>,
    retry: RetryPolicy,
}

impl LlmClient {
    /// Builds the adapter for `config.kind` and wraps it
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let adapter = create_adapter(&config)?;
        Ok(Self::with_adapter(config, adapter))
    }

    /// Wraps an already-built adapter
    pub fn with_adapter(config: ProviderConfig, adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            config,
            adapter,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn provider_name(&self) -> &str {
        self.adapter.name()
    }

    fn options_for(&self, overrides: &AskOverrides) -> CompletionOptions {
        CompletionOptions {
            model: self.config.model.clone(),
            temperature: overrides.temperature.unwrap_or(self.config.temperature),
            max_tokens: overrides.max_tokens.unwrap_or(self.config.max_tokens),
            timeout: overrides.timeout.unwrap_or(self.config.request_timeout),
        }
    }

    /// Sends a request, retrying transient failures.
    ///
    /// Returns the last error once the retry budget is spent. Permanent errors
    /// are returned after the first attempt.
    pub async fn ask(
        &self,
        request: &LlmRequest,
        overrides: &AskOverrides,
    ) -> Result<TextResult, ProviderError> {
        let options = self.options_for(overrides);
        // Each transport leg gets the full per-call timeout
        let budget = options.timeout * self.adapter.transport_legs().max(1);
        let purpose = request.purpose.as_deref().unwrap_or("ask");
        let mut retries = 0u32;

        loop {
            let attempt = retries + 1;
            let start = Instant::now();
            debug!(
                provider = self.adapter.name(),
                purpose = purpose,
                attempt = attempt,
                "Sending LLM request"
            );

            let outcome =
                match tokio::time::timeout(budget, self.adapter.complete(request, &options)).await
                {
                    Ok(result) => result.and_then(normalize),
                    Err(_) => Err(ProviderError::timeout(options.timeout)),
                };

            match outcome {
                Ok(mut result) => {
                    result.latency = start.elapsed();
                    result.attempts = attempt;
                    debug!(
                        provider = self.adapter.name(),
                        purpose = purpose,
                        attempts = attempt,
                        transport = %result.transport,
                        latency_ms = result.latency.as_millis() as u64,
                        "LLM request succeeded"
                    );
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && retries < self.retry.max_retries => {
                    retries += 1;
                    let delay = self.retry.delay_for(retries, &e);
                    warn!(
                        provider = self.adapter.name(),
                        purpose = purpose,
                        attempt = attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Retryable LLM error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        provider = self.adapter.name(),
                        purpose = purpose,
                        attempts = attempt,
                        error = %e,
                        "LLM request failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}

/// Trims the reply and rejects empty completions
fn normalize(mut result: TextResult) -> Result<TextResult, ProviderError> {
    let trimmed = result.text.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::invalid_response(
            "Provider returned an empty completion",
            None,
        ));
    }
    if trimmed.len() != result.text.len() {
        result.text = trimmed.to_string();
    }
    Ok(result)
}

impl fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.adapter.name())
            .field("model", &self.config.model)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{MockProvider, MockResponse};
    use crate::llm::provider::ProviderKind;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries)
            .with_delays(Duration::from_millis(1), Duration::from_millis(5))
    }

    fn client_with(mock: Arc<MockProvider>, retries: u32) -> LlmClient {
        LlmClient::with_adapter(ProviderConfig::new(ProviderKind::OpenAi, "sk-test"), mock)
            .with_retry_policy(fast_policy(retries))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        let err = ProviderError::Unavailable {
            message: "503".into(),
        };
        assert_eq!(policy.delay_for(1, &err), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2, &err), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3, &err), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10, &err), Duration::from_secs(8));
    }

    #[test]
    fn test_retry_after_raises_delay_within_cap() {
        let policy = RetryPolicy::default();
        let short = ProviderError::RateLimit {
            retry_after: Some(3),
        };
        assert_eq!(policy.delay_for(1, &short), Duration::from_secs(3));

        let long = ProviderError::RateLimit {
            retry_after: Some(120),
        };
        assert_eq!(policy.delay_for(1, &long), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let mock = Arc::new(MockProvider::new());
        mock.add_response(MockResponse::error(ProviderError::RateLimit {
            retry_after: None,
        }));
        mock.add_response(MockResponse::error(ProviderError::RateLimit {
            retry_after: None,
        }));
        mock.add_response(MockResponse::text("ok"));

        let client = client_with(mock.clone(), 2);
        let result = client
            .ask(&LlmRequest::new("hi"), &AskOverrides::default())
            .await
            .unwrap();

        assert_eq!(result.text, "ok");
        assert_eq!(result.attempts, 3);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_budget_exhausted_returns_last_error() {
        let mock = Arc::new(MockProvider::new());
        for _ in 0..3 {
            mock.add_response(MockResponse::error(ProviderError::Unavailable {
                message: "down".into(),
            }));
        }

        let client = client_with(mock.clone(), 2);
        let err = client
            .ask(&LlmRequest::new("hi"), &AskOverrides::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Unavailable { .. }));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let mock = Arc::new(MockProvider::new());
        mock.add_response(MockResponse::error(ProviderError::Authentication {
            message: "401".into(),
        }));
        mock.add_response(MockResponse::text("never reached"));

        let client = client_with(mock.clone(), 2);
        let err = client
            .ask(&LlmRequest::new("hi"), &AskOverrides::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Authentication { .. }));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_enforced() {
        let mock = Arc::new(MockProvider::new());
        mock.add_response(MockResponse::text("late").with_delay(Duration::from_millis(500)));

        let client = client_with(mock.clone(), 0);
        let err = client
            .ask(
                &LlmRequest::new("hi"),
                &AskOverrides::default().with_timeout(Duration::from_millis(20)),
            )
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::Timeout { timeout_ms: 20 });
    }

    #[tokio::test]
    async fn test_reply_is_trimmed_and_empty_rejected() {
        let mock = Arc::new(MockProvider::new());
        mock.add_response(MockResponse::text("  {\"a\": 1}\n"));
        mock.add_response(MockResponse::text("   "));

        let client = client_with(mock, 0);
        let ok = client
            .ask(&LlmRequest::new("hi"), &AskOverrides::default())
            .await
            .unwrap();
        assert_eq!(ok.text, "{\"a\": 1}");

        let err = client
            .ask(&LlmRequest::new("hi"), &AskOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_overrides_reach_adapter() {
        let mock = Arc::new(MockProvider::new());
        mock.add_response(MockResponse::text("ok"));

        let client = client_with(mock.clone(), 0);
        client
            .ask(
                &LlmRequest::new("hi"),
                &AskOverrides::default()
                    .with_temperature(0.9)
                    .with_max_tokens(64),
            )
            .await
            .unwrap();

        let seen = mock.recorded_options();
        assert_eq!(seen[0].temperature, 0.9);
        assert_eq!(seen[0].max_tokens, 64);
        assert_eq!(seen[0].model, "gpt-4");
    }
}
