//! Azure OpenAI adapter
//!
//! Azure has no native transport in genai, so this adapter always goes
//! straight to the REST API:
//! `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={version}`.

use super::openai::{ChatAuth, ChatCompletionsHttp};
use crate::llm::error::ProviderError;
use crate::llm::provider::{ProviderAdapter, ProviderConfig};
use crate::llm::transport::{complete_with_fallback, Transport};
use crate::llm::types::{CompletionOptions, LlmRequest, TextResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub struct AzureAdapter {
    deployment: String,
    http: Arc<dyn Transport>,
}

impl AzureAdapter {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        config.ensure_complete()?;

        // ensure_complete guarantees both are present
        let endpoint = config.endpoint.as_deref().unwrap_or_default();
        let deployment = config.deployment_name.clone().unwrap_or_default();
        let url = deployment_url(endpoint, &deployment, &config.api_version);

        let http = ChatCompletionsHttp::new(
            url,
            ChatAuth::ApiKeyHeader(config.api_key.clone()),
            false,
            config,
        )?;

        info!(
            "Azure OpenAI adapter ready: deployment={}, api_version={}",
            deployment, config.api_version
        );

        Ok(Self {
            deployment,
            http: Arc::new(http),
        })
    }

    pub fn with_transport(deployment: impl Into<String>, http: Arc<dyn Transport>) -> Self {
        Self {
            deployment: deployment.into(),
            http,
        }
    }
}

fn deployment_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    )
}

#[async_trait]
impl ProviderAdapter for AzureAdapter {
    async fn complete(
        &self,
        request: &LlmRequest,
        options: &CompletionOptions,
    ) -> Result<TextResult, ProviderError> {
        complete_with_fallback(self.name(), None, self.http.as_ref(), request, options).await
    }

    fn name(&self) -> &str {
        "azure"
    }

    fn model_info(&self) -> Option<String> {
        Some(self.deployment.clone())
    }
}

impl fmt::Debug for AzureAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureAdapter")
            .field("deployment", &self.deployment)
            .finish()
    }
}
