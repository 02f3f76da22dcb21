//! OpenAI adapter and the chat-completions REST transport
//!
//! The same wire schema is served by Azure OpenAI; only the URL shape and the
//! auth header differ, so [`ChatCompletionsHttp`] is shared with the Azure
//! adapter.

use crate::llm::error::ProviderError;
use crate::llm::http;
use crate::llm::provider::{ProviderAdapter, ProviderConfig, TransportPreference};
use crate::llm::sdk::GenAiTransport;
use crate::llm::transport::{complete_with_fallback, Transport};
use crate::llm::types::{
    CompletionOptions, LlmRequest, MessageRole, TextResult, TokenUsage, TransportKind,
};
use async_trait::async_trait;
use genai::adapter::AdapterKind;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// How the chat-completions endpoint expects credentials
#[derive(Clone)]
pub(crate) enum ChatAuth {
    /// `Authorization: Bearer <key>`
    Bearer(String),
    /// `api-key: <key>` (Azure)
    ApiKeyHeader(String),
}

/// Raw HTTPS transport for `/chat/completions`
pub(crate) struct ChatCompletionsHttp {
    http_client: Client,
    url: String,
    auth: ChatAuth,
    /// Azure selects the model by deployment and rejects a `model` field
    send_model: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ChatCompletionsHttp {
    pub(crate) fn new(
        url: String,
        auth: ChatAuth,
        send_model: bool,
        config: &ProviderConfig,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: http::build_client(config.request_timeout)?,
            url,
            auth,
            send_model,
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    fn build_body<'a>(
        &self,
        request: &'a LlmRequest,
        options: &'a CompletionOptions,
    ) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        for message in &request.messages {
            messages.push(WireMessage {
                role: role_name(message.role),
                content: &message.content,
            });
        }

        ChatCompletionRequest {
            model: self.send_model.then_some(options.model.as_str()),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        match &self.auth {
            ChatAuth::Bearer(key) => vec![("authorization", format!("Bearer {}", key))],
            ChatAuth::ApiKeyHeader(key) => vec![("api-key", key.clone())],
        }
    }
}

#[async_trait]
impl Transport for ChatCompletionsHttp {
    async fn send(
        &self,
        request: &LlmRequest,
        options: &CompletionOptions,
    ) -> Result<TextResult, ProviderError> {
        let start = Instant::now();
        let body = self.build_body(request, options);
        let text = http::post_json(
            &self.http_client,
            &self.url,
            &self.headers(),
            &body,
            options.timeout,
        )
        .await?;

        let (content, usage) = parse_chat_completion(&text)?;
        debug!(
            "Chat completion received in {:.2}s",
            start.elapsed().as_secs_f64()
        );

        let mut result = TextResult::new(content, TransportKind::Http, start.elapsed());
        if let Some(usage) = usage {
            result = result.with_usage(usage);
        }
        Ok(result)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }
}

/// Extracts the first choice's text and usage from a chat-completions body
pub(crate) fn parse_chat_completion(
    body: &str,
) -> Result<(String, Option<TokenUsage>), ProviderError> {
    let response: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response(format!("Failed to parse completion: {}", e), Some(body))
    })?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::invalid_response("No choices in response", Some(body)))?;

    let usage = response.usage.map(|u| TokenUsage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
    });

    Ok((content, usage))
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

/// OpenAI chat-completions adapter
pub struct OpenAiAdapter {
    model: String,
    native: Option<Arc<dyn Transport>>,
    http: Arc<dyn Transport>,
}

impl OpenAiAdapter {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        config.ensure_complete()?;

        let base = config
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_BASE_URL)
            .trim_end_matches('/');
        let http = ChatCompletionsHttp::new(
            format!("{}/chat/completions", base),
            ChatAuth::Bearer(config.api_key.clone()),
            true,
            config,
        )?;

        let native: Option<Arc<dyn Transport>> = match config.transport {
            TransportPreference::SdkFirst => {
                Some(Arc::new(GenAiTransport::new(AdapterKind::OpenAI, config)))
            }
            TransportPreference::HttpOnly => None,
        };

        info!(
            "OpenAI adapter ready: model={}, url={}, sdk={}",
            config.model,
            http.url(),
            native.is_some()
        );

        Ok(Self {
            model: config.model.clone(),
            native,
            http: Arc::new(http),
        })
    }

    /// Assembles an adapter from explicit transports
    pub fn with_transports(
        model: impl Into<String>,
        native: Option<Arc<dyn Transport>>,
        http: Arc<dyn Transport>,
    ) -> Self {
        Self {
            model: model.into(),
            native,
            http,
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn complete(
        &self,
        request: &LlmRequest,
        options: &CompletionOptions,
    ) -> Result<TextResult, ProviderError> {
        complete_with_fallback(
            self.name(),
            self.native.as_deref(),
            self.http.as_ref(),
            request,
            options,
        )
        .await
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model_info(&self) -> Option<String> {
        Some(self.model.clone())
    }

    fn transport_legs(&self) -> u32 {
        if self.native.is_some() {
            2
        } else {
            1
        }
    }
}

impl fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("model", &self.model)
            .field("sdk", &self.native.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::ProviderKind;
    use std::time::Duration;

    fn options() -> CompletionOptions {
        CompletionOptions {
            model: "gpt-4".into(),
            temperature: 0.3,
            max_tokens: 2000,
            timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_request_serialization() {
        let config = ProviderConfig::new(ProviderKind::OpenAi, "sk-test");
        let transport = ChatCompletionsHttp::new(
            "https://api.openai.com/v1/chat/completions".into(),
            ChatAuth::Bearer("sk-test".into()),
            true,
            &config,
        )
        .unwrap();

        let request = LlmRequest::new("Why does this crash?").with_system("You debug code");
        let options = options();
        let body = serde_json::to_value(transport.build_body(&request, &options)).unwrap();

        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Why does this crash?");
        assert_eq!(body["max_tokens"], 2000);
    }

    #[test]
    fn test_model_omitted_when_disabled() {
        let config = ProviderConfig::new(ProviderKind::Azure, "key");
        let transport = ChatCompletionsHttp::new(
            "https://example/chat/completions".into(),
            ChatAuth::ApiKeyHeader("key".into()),
            false,
            &config,
        )
        .unwrap();

        let request = LlmRequest::new("hi");
        let options = options();
        let body = serde_json::to_value(transport.build_body(&request, &options)).unwrap();
        assert!(body.get("model").is_none());
        assert_eq!(transport.headers()[0].0, "api-key");
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"cause\":\"x\"}"}}],
            "usage": {"prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49}
        }"#;

        let (content, usage) = parse_chat_completion(body).unwrap();
        assert_eq!(content, "{\"cause\":\"x\"}");
        assert_eq!(usage.unwrap().total(), 49);
    }

    #[test]
    fn test_empty_choices_is_invalid() {
        let err = parse_chat_completion(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[test]
    fn test_garbage_body_is_invalid() {
        let err = parse_chat_completion("<html>502</html>").unwrap_err();
        match err {
            ProviderError::InvalidResponse { raw_response, .. } => {
                assert_eq!(raw_response.as_deref(), Some("<html>502</html>"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_adapter_uses_custom_base_url() {
        let config = ProviderConfig::new(ProviderKind::OpenAi, "sk-test")
            .with_endpoint("http://localhost:8080/v1/")
            .with_transport(TransportPreference::HttpOnly);
        let adapter = OpenAiAdapter::new(&config).unwrap();
        assert!(adapter.native.is_none());
        assert_eq!(adapter.model_info().as_deref(), Some("gpt-4"));
    }

    #[test]
    fn test_adapter_requires_key() {
        let config = ProviderConfig::new(ProviderKind::OpenAi, "");
        assert!(OpenAiAdapter::new(&config).is_err());
    }
}
