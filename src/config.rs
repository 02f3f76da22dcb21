//! Configuration management for debuglens
//!
//! Settings are resolved once at startup, lowest precedence first:
//! built-in defaults, an optional TOML file, then environment variables.
//! CLI flags are applied on top by the binary. The analysis core never
//! reads files or the environment itself; it only receives the
//! [`ProviderConfig`] produced here.
//!
//! # Environment Variables
//!
//! - `DEBUGLENS_PROVIDER`: openai | azure | anthropic (default: openai)
//! - `DEBUGLENS_MODEL`: model name (default depends on the provider)
//! - `DEBUGLENS_API_KEY`: credential; falls back to `OPENAI_API_KEY`,
//!   `AZURE_OPENAI_API_KEY` or `ANTHROPIC_API_KEY` depending on the provider
//! - `DEBUGLENS_ENDPOINT`, `DEBUGLENS_DEPLOYMENT`, `DEBUGLENS_API_VERSION`
//! - `DEBUGLENS_TEMPERATURE`, `DEBUGLENS_MAX_TOKENS`
//! - `DEBUGLENS_REQUEST_TIMEOUT` (seconds), `DEBUGLENS_MAX_RETRIES`
//! - `DEBUGLENS_TRANSPORT`: sdk-first | http-only
//! - `DEBUGLENS_KB_URL` (empty disables the lookup), `DEBUGLENS_KB_TOP_K`
//! - `DEBUGLENS_MAX_TURNS`
//! - `DEBUGLENS_LOG_LEVEL`
//!
//! # Example
//!
//! ```toml
//! provider = "anthropic"
//! model = "claude-3-opus-20240229"
//! max_retries = 3
//!
//! [prompts.solution]
//! system = "You are a pragmatic staff engineer."
//! user = "Propose a fix for: {root_cause}"
//! ```

use crate::analysis::PromptTemplates;
use crate::dialog::{
    SessionStoreConfig, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_SESSIONS, DEFAULT_MAX_TURNS,
};
use crate::knowledge::{
    HttpKnowledgeBase, DEFAULT_KB_ENDPOINT, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K,
};
use crate::llm::provider::{
    DEFAULT_AZURE_API_VERSION, DEFAULT_MAX_TOKENS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_TEMPERATURE,
};
use crate::llm::client::DEFAULT_MAX_RETRIES;
use crate::llm::{mask_secret, ProviderConfig, ProviderKind, RetryPolicy, TransportPreference};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_KB_TIMEOUT_SECS: u64 = 10;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider: {0}. Valid options: openai, azure, anthropic")]
    InvalidProvider(String),

    #[error("No API key for provider {provider}. Set DEBUGLENS_API_KEY or {env_var}")]
    MissingCredential {
        provider: ProviderKind,
        env_var: &'static str,
    },

    #[error("Azure OpenAI requires {0}")]
    MissingEndpoint(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration structure for debuglens
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuglensConfig {
    pub provider: ProviderKind,
    /// Falls back to the provider's default model
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub deployment_name: Option<String>,
    pub api_version: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub transport: TransportPreference,

    /// Similar-bug lookup; `None` disables it
    pub knowledge_base_url: Option<String>,
    pub knowledge_base_top_k: usize,
    pub knowledge_base_threshold: f32,
    pub knowledge_base_timeout_secs: u64,

    pub max_turns: usize,
    pub max_sessions: usize,
    pub session_idle_secs: u64,

    pub log_level: String,

    pub prompts: PromptTemplates,
}

impl Default for DebuglensConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: None,
            api_key: None,
            endpoint: None,
            deployment_name: None,
            api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            transport: TransportPreference::default(),
            knowledge_base_url: Some(DEFAULT_KB_ENDPOINT.to_string()),
            knowledge_base_top_k: DEFAULT_TOP_K,
            knowledge_base_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            knowledge_base_timeout_secs: DEFAULT_KB_TIMEOUT_SECS,
            max_turns: DEFAULT_MAX_TURNS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_idle_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            prompts: PromptTemplates::default(),
        }
    }
}

impl DebuglensConfig {
    /// Defaults, then `path` (if any), then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Reads a TOML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Applies `DEBUGLENS_*` overrides read through `lookup`
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("DEBUGLENS_PROVIDER") {
            self.provider = provider
                .parse()
                .map_err(|_| ConfigError::InvalidProvider(provider.clone()))?;
        }

        if let Some(model) = non_empty(lookup("DEBUGLENS_MODEL")) {
            self.model = Some(model);
        }

        match non_empty(lookup("DEBUGLENS_API_KEY")) {
            Some(key) => self.api_key = Some(key),
            None if self.api_key.is_none() => {
                self.api_key = non_empty(lookup(self.provider.api_key_env_var()));
            }
            None => {}
        }

        if let Some(endpoint) = non_empty(lookup("DEBUGLENS_ENDPOINT")) {
            self.endpoint = Some(endpoint);
        }
        if let Some(deployment) = non_empty(lookup("DEBUGLENS_DEPLOYMENT")) {
            self.deployment_name = Some(deployment);
        }
        if let Some(version) = non_empty(lookup("DEBUGLENS_API_VERSION")) {
            self.api_version = version;
        }

        if let Some(value) = parse_var(&lookup, "DEBUGLENS_TEMPERATURE")? {
            self.temperature = value;
        }
        if let Some(value) = parse_var(&lookup, "DEBUGLENS_MAX_TOKENS")? {
            self.max_tokens = value;
        }
        if let Some(value) = parse_var(&lookup, "DEBUGLENS_REQUEST_TIMEOUT")? {
            self.request_timeout_secs = value;
        }
        if let Some(value) = parse_var(&lookup, "DEBUGLENS_MAX_RETRIES")? {
            self.max_retries = value;
        }
        if let Some(value) = parse_var(&lookup, "DEBUGLENS_TRANSPORT")? {
            self.transport = value;
        }

        if let Some(url) = lookup("DEBUGLENS_KB_URL") {
            self.knowledge_base_url = non_empty(Some(url));
        }
        if let Some(value) = parse_var(&lookup, "DEBUGLENS_KB_TOP_K")? {
            self.knowledge_base_top_k = value;
        }
        if let Some(value) = parse_var(&lookup, "DEBUGLENS_MAX_TURNS")? {
            self.max_turns = value;
        }

        if let Some(level) = non_empty(lookup("DEBUGLENS_LOG_LEVEL")) {
            self.log_level = level.to_lowercase();
        }

        Ok(())
    }

    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Validates ranges and provider requirements
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
            return Err(ConfigError::ValidationFailed(
                "Request timeout cannot exceed 10 minutes".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.knowledge_base_threshold) {
            return Err(ConfigError::ValidationFailed(format!(
                "Knowledge base threshold must be between 0.0 and 1.0, got {}",
                self.knowledge_base_threshold
            )));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        self.provider_config().map(|_| ())
    }

    /// Converts into the immutable provider settings used by the LLM layer
    pub fn provider_config(&self) -> Result<ProviderConfig, ConfigError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingCredential {
                provider: self.provider,
                env_var: self.provider.api_key_env_var(),
            })?;

        let mut config = ProviderConfig::new(self.provider, api_key)
            .with_model(self.model_name())
            .with_api_version(self.api_version.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_transport(self.transport);

        if let Some(endpoint) = &self.endpoint {
            config = config.with_endpoint(endpoint.clone());
        }
        if let Some(deployment) = &self.deployment_name {
            config = config.with_deployment(deployment.clone());
        }

        if self.provider == ProviderKind::Azure {
            if config.endpoint.is_none() {
                return Err(ConfigError::MissingEndpoint(
                    "an endpoint (DEBUGLENS_ENDPOINT)".to_string(),
                ));
            }
            if config.deployment_name.is_none() {
                return Err(ConfigError::MissingEndpoint(
                    "a deployment name (DEBUGLENS_DEPLOYMENT)".to_string(),
                ));
            }
        }

        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }

    pub fn session_store_config(&self) -> SessionStoreConfig {
        SessionStoreConfig {
            max_turns: self.max_turns,
            max_sessions: self.max_sessions,
            idle_timeout: Duration::from_secs(self.session_idle_secs),
        }
    }

    /// The configured knowledge base, if enabled
    pub fn knowledge_base_timeout(&self) -> Duration {
        Duration::from_secs(self.knowledge_base_timeout_secs)
    }

    pub fn knowledge_base(&self) -> Result<Option<HttpKnowledgeBase>, ConfigError> {
        let Some(url) = &self.knowledge_base_url else {
            return Ok(None);
        };
        HttpKnowledgeBase::new(
            url.clone(),
            self.knowledge_base_threshold,
            self.knowledge_base_timeout(),
        )
        .map(Some)
        .map_err(|e| ConfigError::ValidationFailed(e.to_string()))
    }

    /// Copy safe to print or serialize
    pub fn masked(&self) -> Self {
        Self {
            api_key: self.api_key.as_deref().map(mask_secret),
            ..self.clone()
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup(key)) {
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| ConfigError::ParseError {
            field: key.to_string(),
            error: e.to_string(),
        }),
        None => Ok(None),
    }
}

impl fmt::Debug for DebuglensConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebuglensConfig")
            .field("provider", &self.provider)
            .field("model", &self.model_name())
            .field("api_key", &self.api_key.as_deref().map(mask_secret))
            .field("endpoint", &self.endpoint)
            .field("deployment_name", &self.deployment_name)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("transport", &self.transport)
            .field("knowledge_base_url", &self.knowledge_base_url)
            .field("max_turns", &self.max_turns)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for DebuglensConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Debuglens Configuration:")?;
        writeln!(f, "  Provider: {}", self.provider)?;
        writeln!(f, "  Model: {}", self.model_name())?;
        match &self.api_key {
            Some(key) => writeln!(f, "  API Key: {}", mask_secret(key))?,
            None => writeln!(f, "  API Key: (not set)")?,
        }
        if let Some(endpoint) = &self.endpoint {
            writeln!(f, "  Endpoint: {}", endpoint)?;
        }
        if let Some(deployment) = &self.deployment_name {
            writeln!(f, "  Deployment: {}", deployment)?;
        }
        writeln!(f, "  Temperature: {}", self.temperature)?;
        writeln!(f, "  Max Tokens: {}", self.max_tokens)?;
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(f, "  Max Retries: {}", self.max_retries)?;
        writeln!(f, "  Transport: {:?}", self.transport)?;
        match &self.knowledge_base_url {
            Some(url) => writeln!(
                f,
                "  Knowledge Base: {} (top {}, threshold {})",
                url, self.knowledge_base_top_k, self.knowledge_base_threshold
            )?,
            None => writeln!(f, "  Knowledge Base: disabled")?,
        }
        writeln!(f, "  Max Turns: {}", self.max_turns)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn unset(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    fn test_defaults() {
        let config = DebuglensConfig::default();
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.model_name(), "gpt-4");
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.max_tokens, 2000);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.knowledge_base_top_k, 5);
        assert_eq!(config.max_turns, 5);
        assert_eq!(config.api_version, "2023-05-15");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = DebuglensConfig::default();
        config
            .apply_env_from(lookup(&[
                ("DEBUGLENS_PROVIDER", "claude"),
                ("DEBUGLENS_MAX_RETRIES", "4"),
                ("DEBUGLENS_TRANSPORT", "http-only"),
                ("DEBUGLENS_LOG_LEVEL", "DEBUG"),
                ("DEBUGLENS_KB_URL", ""),
                ("ANTHROPIC_API_KEY", "sk-ant-123456789"),
            ]))
            .unwrap();

        assert_eq!(config.provider, ProviderKind::Anthropic);
        assert_eq!(config.model_name(), "claude-3-opus-20240229");
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.transport, TransportPreference::HttpOnly);
        assert_eq!(config.log_level, "debug");
        assert!(config.knowledge_base_url.is_none());
        assert_eq!(config.api_key.as_deref(), Some("sk-ant-123456789"));
    }

    #[test]
    fn test_explicit_key_wins_over_vendor_key() {
        let mut config = DebuglensConfig::default();
        config
            .apply_env_from(lookup(&[
                ("DEBUGLENS_API_KEY", "explicit"),
                ("OPENAI_API_KEY", "vendor"),
            ]))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("explicit"));
    }

    #[test]
    fn test_invalid_env_values() {
        let mut config = DebuglensConfig::default();
        assert!(matches!(
            config.apply_env_from(lookup(&[("DEBUGLENS_PROVIDER", "gemini")])),
            Err(ConfigError::InvalidProvider(_))
        ));
        assert!(matches!(
            config.apply_env_from(lookup(&[("DEBUGLENS_MAX_TOKENS", "lots")])),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_validation_requires_credential() {
        let config = DebuglensConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredential {
                env_var: "OPENAI_API_KEY",
                ..
            })
        ));
    }

    #[test]
    fn test_validation_ranges() {
        let valid = DebuglensConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        let mut config = valid.clone();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid.clone();
        config.temperature = 2.5;
        assert!(config.validate().is_err());

        let mut config = valid.clone();
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_azure_requires_endpoint_and_deployment() {
        let mut config = DebuglensConfig {
            provider: ProviderKind::Azure,
            api_key: Some("az-key".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.provider_config(),
            Err(ConfigError::MissingEndpoint(_))
        ));

        config.endpoint = Some("https://acme.openai.azure.com".to_string());
        assert!(config.provider_config().is_err());

        config.deployment_name = Some("gpt4-prod".to_string());
        let provider = config.provider_config().unwrap();
        assert_eq!(provider.deployment_name.as_deref(), Some("gpt4-prod"));
        assert_eq!(provider.api_version, "2023-05-15");
    }

    #[test]
    fn test_from_file_with_prompt_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
provider = "anthropic"
max_turns = 3

[prompts.solution]
system = "Be brief."
user = "Fix: {{root_cause}}"
"#
        )
        .unwrap();

        let config = DebuglensConfig::from_file(file.path()).unwrap();
        assert_eq!(config.provider, ProviderKind::Anthropic);
        assert_eq!(config.max_turns, 3);
        assert_eq!(config.prompts.solution.user, "Fix: {root_cause}");
        assert_eq!(config.prompts.error, PromptTemplates::default().error);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            DebuglensConfig::from_file(Path::new("/nonexistent/debuglens.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_load_reads_process_environment() {
        let _guards = vec![
            EnvGuard::set("DEBUGLENS_PROVIDER", "openai"),
            EnvGuard::set("DEBUGLENS_MODEL", "gpt-4o"),
            EnvGuard::unset("DEBUGLENS_API_KEY"),
            EnvGuard::set("OPENAI_API_KEY", "sk-from-env-1234"),
        ];

        let config = DebuglensConfig::load(None).unwrap();
        assert_eq!(config.model_name(), "gpt-4o");
        assert_eq!(config.api_key.as_deref(), Some("sk-from-env-1234"));
    }

    #[test]
    fn test_masked_hides_key() {
        let config = DebuglensConfig {
            api_key: Some("sk-abcdefghijklmnop".to_string()),
            ..Default::default()
        };
        let masked = config.masked();
        assert_eq!(masked.api_key.as_deref(), Some("sk-a...mnop"));
        assert!(!format!("{:?}", config).contains("abcdefghijkl"));
        assert!(!format!("{}", config).contains("abcdefghijkl"));
    }
}
