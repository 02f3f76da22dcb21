//! Adapter factory

use super::error::ProviderError;
use super::provider::{ProviderAdapter, ProviderConfig, ProviderKind};
use super::providers::{AnthropicAdapter, AzureAdapter, OpenAiAdapter};
use std::sync::Arc;
use tracing::debug;

/// Builds the adapter matching `config.kind`
pub fn create_adapter(config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    debug!(provider = %config.kind, model = %config.model, "Creating provider adapter");

    let adapter: Arc<dyn ProviderAdapter> = match config.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiAdapter::new(config)?),
        ProviderKind::Azure => Arc::new(AzureAdapter::new(config)?),
        ProviderKind::Anthropic => Arc::new(AnthropicAdapter::new(config)?),
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_each_provider() {
        let openai = create_adapter(&ProviderConfig::new(ProviderKind::OpenAi, "sk-1")).unwrap();
        assert_eq!(openai.name(), "openai");

        let anthropic =
            create_adapter(&ProviderConfig::new(ProviderKind::Anthropic, "sk-ant")).unwrap();
        assert_eq!(anthropic.name(), "anthropic");

        let azure = create_adapter(
            &ProviderConfig::new(ProviderKind::Azure, "key")
                .with_endpoint("https://res.openai.azure.com")
                .with_deployment("gpt4"),
        )
        .unwrap();
        assert_eq!(azure.name(), "azure");
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let err = create_adapter(&ProviderConfig::new(ProviderKind::OpenAi, ""))
            .err()
            .expect("expected configuration error");
        assert!(matches!(err, ProviderError::Configuration { .. }));
    }
}
