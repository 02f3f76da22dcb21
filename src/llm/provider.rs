//! Provider adapter abstraction
//!
//! A [`ProviderAdapter`] turns an [`LlmRequest`] into a [`TextResult`] for one
//! vendor. Adapters own their transports and hide the SDK-first, HTTP-second
//! fallback from callers.

use super::error::ProviderError;
use super::types::{CompletionOptions, LlmRequest, TextResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_AZURE_API_VERSION: &str = "2023-05-15";

/// Supported LLM vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure")]
    Azure,
    #[serde(rename = "anthropic")]
    Anthropic,
}

impl ProviderKind {
    /// Lowercase name used in config files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Azure => "azure",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    /// Model used when none is configured
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi | ProviderKind::Azure => "gpt-4",
            ProviderKind::Anthropic => "claude-3-opus-20240229",
        }
    }

    /// Vendor-specific environment variable holding the API key
    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Azure => "AZURE_OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "azure" | "azure-openai" | "azure_openai" => Ok(ProviderKind::Azure),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => Err(format!(
                "unknown provider '{}' (expected openai, azure or anthropic)",
                other
            )),
        }
    }
}

/// Transport order used by adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportPreference {
    /// Try the native SDK first, fall back to raw HTTP on transport failures
    #[default]
    SdkFirst,
    /// Skip the SDK entirely
    HttpOnly,
}

impl FromStr for TransportPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sdk-first" | "sdk_first" | "sdk" => Ok(TransportPreference::SdkFirst),
            "http-only" | "http_only" | "http" => Ok(TransportPreference::HttpOnly),
            other => Err(format!(
                "unknown transport '{}' (expected sdk-first or http-only)",
                other
            )),
        }
    }
}

/// Resolved provider settings
///
/// Built once at startup and never mutated afterwards; the client and every
/// adapter only hold shared references or clones of it.
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: String,
    /// Base URL override (OpenAI/Anthropic) or resource endpoint (Azure)
    pub endpoint: Option<String>,
    /// Azure deployment name
    pub deployment_name: Option<String>,
    /// Azure REST api-version
    pub api_version: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub transport: TransportPreference,
}

impl ProviderConfig {
    /// Creates a config with the vendor's default model and the crate-wide
    /// defaults for sampling, timeout and transport order.
    ///
    /// # Arguments
    ///
    /// * `kind` - Vendor to talk to
    /// * `api_key` - Credential sent with every request
    ///
    /// # Example
    ///
    /// ```
    /// use debuglens::llm::{ProviderConfig, ProviderKind};
    ///
    /// let config = ProviderConfig::new(ProviderKind::OpenAi, "sk-test").with_max_tokens(512);
    /// assert_eq!(config.model, ProviderKind::OpenAi.default_model());
    /// assert_eq!(config.max_tokens, 512);
    /// ```
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            model: kind.default_model().to_string(),
            api_key: api_key.into(),
            endpoint: None,
            deployment_name: None,
            api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            transport: TransportPreference::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment_name = Some(deployment.into());
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_transport(mut self, transport: TransportPreference) -> Self {
        self.transport = transport;
        self
    }

    /// Checks that the adapter for this provider can be built.
    ///
    /// Every provider needs a non-blank API key. Azure additionally needs an
    /// endpoint and a deployment name.
    ///
    /// # Example
    ///
    /// ```
    /// use debuglens::llm::{ProviderConfig, ProviderKind};
    ///
    /// let azure = ProviderConfig::new(ProviderKind::Azure, "key");
    /// assert!(azure.ensure_complete().is_err());
    ///
    /// let azure = azure
    ///     .with_endpoint("https://example.openai.azure.com")
    ///     .with_deployment("gpt-4o");
    /// assert!(azure.ensure_complete().is_ok());
    /// ```
    pub fn ensure_complete(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::Configuration {
                message: format!("API key for provider '{}' is empty", self.kind),
            });
        }
        if self.kind == ProviderKind::Azure {
            if self.endpoint.as_deref().map_or(true, |e| e.trim().is_empty()) {
                return Err(ProviderError::Configuration {
                    message: "Azure provider requires an endpoint".to_string(),
                });
            }
            if self
                .deployment_name
                .as_deref()
                .map_or(true, |d| d.trim().is_empty())
            {
                return Err(ProviderError::Configuration {
                    message: "Azure provider requires a deployment name".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_key", &mask_secret(&self.api_key))
            .field("endpoint", &self.endpoint)
            .field("deployment_name", &self.deployment_name)
            .field("api_version", &self.api_version)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout", &self.request_timeout)
            .field("transport", &self.transport)
            .finish()
    }
}

/// Masks a secret for display, keeping a short prefix and suffix.
///
/// Secrets of eight characters or fewer are fully hidden.
///
/// # Example
///
/// ```
/// use debuglens::llm::mask_secret;
///
/// assert_eq!(mask_secret("sk-1234567890"), "sk-1...7890");
/// assert_eq!(mask_secret("short"), "****");
/// assert_eq!(mask_secret(""), "");
/// ```
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Vendor adapter
///
/// Implementations are stateless apart from their HTTP clients and may be
/// shared across concurrent analysis stages.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Sends a request and returns the normalized completion
    async fn complete(
        &self,
        request: &LlmRequest,
        options: &CompletionOptions,
    ) -> Result<TextResult, ProviderError>;

    /// Provider name used in logs
    fn name(&self) -> &str;

    /// Model or deployment identifier, if the adapter knows it
    fn model_info(&self) -> Option<String> {
        None
    }

    /// Most transports one call may go through in sequence.
    ///
    /// The client multiplies its per-call timeout by this value, so an
    /// adapter that falls back from SDK to HTTP still gives the HTTP leg a
    /// full timeout of its own.
    fn transport_legs(&self) -> u32 {
        1
    }
}
