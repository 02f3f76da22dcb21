//! Anthropic Messages API adapter

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

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Raw HTTPS transport for `/messages`
pub(crate) struct MessagesHttp {
    http_client: Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl MessagesHttp {
    pub(crate) fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base = config
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ANTHROPIC_BASE_URL)
            .trim_end_matches('/');
        Ok(Self {
            http_client: http::build_client(config.request_timeout)?,
            url: format!("{}/messages", base),
            api_key: config.api_key.clone(),
        })
    }

    /// System text goes top-level; inline system messages are folded into it
    fn build_body<'a>(
        request: &'a LlmRequest,
        options: &'a CompletionOptions,
    ) -> MessagesRequest<'a> {
        let mut system_parts: Vec<&str> = Vec::new();
        if let Some(system) = &request.system {
            system_parts.push(system);
        }

        let mut messages = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            match message.role {
                MessageRole::System => system_parts.push(&message.content),
                MessageRole::User => messages.push(WireMessage {
                    role: "user",
                    content: &message.content,
                }),
                MessageRole::Assistant => messages.push(WireMessage {
                    role: "assistant",
                    content: &message.content,
                }),
            }
        }

        MessagesRequest {
            model: &options.model,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
            messages,
        }
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("x-api-key", self.api_key.clone()),
            ("anthropic-version", ANTHROPIC_API_VERSION.to_string()),
        ]
    }
}

#[async_trait]
impl Transport for MessagesHttp {
    async fn send(
        &self,
        request: &LlmRequest,
        options: &CompletionOptions,
    ) -> Result<TextResult, ProviderError> {
        let start = Instant::now();
        let body = Self::build_body(request, options);
        let text = http::post_json(
            &self.http_client,
            &self.url,
            &self.headers(),
            &body,
            options.timeout,
        )
        .await?;

        let (content, usage) = parse_messages_response(&text)?;
        debug!(
            "Anthropic message received in {:.2}s",
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

/// Joins every text block of a Messages API reply
pub(crate) fn parse_messages_response(
    body: &str,
) -> Result<(String, Option<TokenUsage>), ProviderError> {
    let response: MessagesResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response(format!("Failed to parse message: {}", e), Some(body))
    })?;

    let text = response
        .content
        .into_iter()
        .filter(|block| block.block_type == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(ProviderError::invalid_response(
            "No text content in response",
            Some(body),
        ));
    }

    let usage = response.usage.map(|u| TokenUsage {
        prompt_tokens: u.input_tokens,
        completion_tokens: u.output_tokens,
    });

    Ok((text, usage))
}

/// Anthropic adapter
pub struct AnthropicAdapter {
    model: String,
    native: Option<Arc<dyn Transport>>,
    http: Arc<dyn Transport>,
}

impl AnthropicAdapter {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        config.ensure_complete()?;

        let http = MessagesHttp::new(config)?;
        let native: Option<Arc<dyn Transport>> = match config.transport {
            TransportPreference::SdkFirst => {
                Some(Arc::new(GenAiTransport::new(AdapterKind::Anthropic, config)))
            }
            TransportPreference::HttpOnly => None,
        };

        info!(
            "Anthropic adapter ready: model={}, url={}, sdk={}",
            config.model,
            http.url,
            native.is_some()
        );

        Ok(Self {
            model: config.model.clone(),
            native,
            http: Arc::new(http),
        })
    }

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
impl ProviderAdapter for AnthropicAdapter {
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
        "anthropic"
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

impl fmt::Debug for AnthropicAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicAdapter")
            .field("model", &self.model)
            .field("sdk", &self.native.is_some())
            .finish()
    }
}
