//! Native SDK transport backed by the `genai` crate
//!
//! Used as the first-choice transport for OpenAI and Anthropic. Credentials
//! and the optional base URL come from [`ProviderConfig`] through a service
//! target resolver, so nothing is read from the environment here.

use super::error::ProviderError;
use super::provider::ProviderConfig;
use super::transport::Transport;
use super::types::{CompletionOptions, LlmRequest, MessageRole, TextResult, TokenUsage, TransportKind};
use async_trait::async_trait;
use genai::adapter::AdapterKind;
use genai::chat::{ChatMessage as GenAIChatMessage, ChatOptions, ChatRequest as GenAIChatRequest};
use genai::resolver::{AuthData, Endpoint, ServiceTargetResolver};
use genai::{Client, ModelIden, ServiceTarget};
use std::fmt;
use std::time::Instant;
use tracing::{debug, error};

pub struct GenAiTransport {
    client: Client,
    adapter: AdapterKind,
}

impl GenAiTransport {
    pub fn new(adapter: AdapterKind, config: &ProviderConfig) -> Self {
        let api_key = config.api_key.clone();
        let model = config.model.clone();
        let endpoint_override = config.endpoint.clone().map(with_trailing_slash);

        debug!(
            "Creating genai transport: adapter={}, model={}, custom_endpoint={}",
            adapter.as_str(),
            model,
            endpoint_override.is_some()
        );

        let resolver = ServiceTargetResolver::from_resolver_fn(
            move |service_target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
                let ServiceTarget {
                    endpoint: default_endpoint,
                    ..
                } = service_target;

                let endpoint = match &endpoint_override {
                    Some(url) => Endpoint::from_owned(url.clone()),
                    None => default_endpoint,
                };

                Ok(ServiceTarget {
                    endpoint,
                    auth: AuthData::from_single(api_key.clone()),
                    model: ModelIden::new(adapter, &model),
                })
            },
        );

        let client = Client::builder()
            .with_service_target_resolver(resolver)
            .build();

        Self { client, adapter }
    }

    fn convert_request(request: &LlmRequest) -> GenAIChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(GenAIChatMessage::system(system));
        }
        for message in &request.messages {
            messages.push(match message.role {
                MessageRole::System => GenAIChatMessage::system(&message.content),
                MessageRole::User => GenAIChatMessage::user(&message.content),
                MessageRole::Assistant => GenAIChatMessage::assistant(&message.content),
            });
        }
        GenAIChatRequest::new(messages)
    }
}

#[async_trait]
impl Transport for GenAiTransport {
    async fn send(
        &self,
        request: &LlmRequest,
        options: &CompletionOptions,
    ) -> Result<TextResult, ProviderError> {
        let start = Instant::now();
        let chat_options = ChatOptions::default()
            .with_temperature(options.temperature as f64)
            .with_max_tokens(options.max_tokens);

        let response = match tokio::time::timeout(
            options.timeout,
            self.client.exec_chat(
                &options.model,
                Self::convert_request(request),
                Some(&chat_options),
            ),
        )
        .await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                error!("{} SDK error: {}", self.adapter.as_str(), e);
                return Err(classify_sdk_error(&e.to_string()));
            }
            Err(_) => {
                error!(
                    "{} SDK request timed out after {:?}",
                    self.adapter.as_str(),
                    options.timeout
                );
                return Err(ProviderError::timeout(options.timeout));
            }
        };

        let text = response
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::invalid_response("SDK response has no text content", None))?;

        let usage = TokenUsage {
            prompt_tokens: response.usage.prompt_tokens.unwrap_or(0).max(0) as u32,
            completion_tokens: response.usage.completion_tokens.unwrap_or(0).max(0) as u32,
        };

        Ok(TextResult::new(text, TransportKind::Sdk, start.elapsed()).with_usage(usage))
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Sdk
    }
}

impl fmt::Debug for GenAiTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenAiTransport")
            .field("adapter", &self.adapter.as_str())
            .finish()
    }
}

/// Maps a genai error message onto the provider taxonomy.
///
/// genai folds HTTP status and body into its error text, so classification
/// works on the rendered message. Anything unrecognised counts as a transport
/// failure and lets the adapter retry over raw HTTP.
pub(crate) fn classify_sdk_error(message: &str) -> ProviderError {
    let lower = message.to_lowercase();

    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("invalid api key")
        || lower.contains("invalid x-api-key")
        || lower.contains("authentication")
    {
        ProviderError::Authentication {
            message: message.to_string(),
        }
    } else if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        ProviderError::RateLimit { retry_after: None }
    } else if lower.contains("400")
        || lower.contains("404")
        || lower.contains("bad request")
        || lower.contains("no chat response")
        || lower.contains("json")
    {
        ProviderError::invalid_response(message, None)
    } else {
        ProviderError::Unavailable {
            message: message.to_string(),
        }
    }
}

fn with_trailing_slash(url: String) -> String {
    if url.ends_with('/') {
        url
    } else {
        format!("{}/", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::ProviderKind;

    #[test]
    fn test_classify_auth() {
        let err = classify_sdk_error("Web call failed: HTTP 401 Unauthorized");
        assert!(matches!(err, ProviderError::Authentication { .. }));
    }

    #[test]
    fn test_classify_rate_limit() {
        let err = classify_sdk_error("status 429: Rate limit reached for gpt-4");
        assert_eq!(err, ProviderError::RateLimit { retry_after: None });
    }

    #[test]
    fn test_classify_content_error() {
        let err = classify_sdk_error("Failed to parse JSON body");
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[test]
    fn test_classify_connection_as_transport() {
        let err = classify_sdk_error("error sending request: connection refused");
        assert!(err.is_transport());
    }

    #[test]
    fn test_trailing_slash() {
        assert_eq!(
            with_trailing_slash("https://proxy.local/v1".into()),
            "https://proxy.local/v1/"
        );
        assert_eq!(
            with_trailing_slash("https://proxy.local/v1/".into()),
            "https://proxy.local/v1/"
        );
    }

    #[test]
    fn test_convert_request_puts_system_first() {
        let request = LlmRequest::new("question").with_system("rules");
        let converted = GenAiTransport::convert_request(&request);
        assert_eq!(converted.messages.len(), 2);
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = ProviderConfig::new(ProviderKind::OpenAi, "sk-secret-value-123");
        let transport = GenAiTransport::new(AdapterKind::OpenAI, &config);
        let debug = format!("{:?}", transport);
        assert!(!debug.contains("sk-secret"));
    }
}
