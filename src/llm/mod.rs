//! LLM access layer
//!
//! Provider adapters (OpenAI, Azure OpenAI, Anthropic) sit behind the
//! [`ProviderAdapter`] trait; [`LlmClient`] adds timeouts, retries and reply
//! normalization on top of whichever adapter is configured.

pub mod client;
pub mod error;
pub mod factory;
pub(crate) mod http;
pub mod mock;
pub mod provider;
pub mod providers;
pub mod sdk;
pub mod transport;
pub mod types;

pub use client::{AskOverrides, LlmClient, RetryPolicy};
pub use error::ProviderError;
pub use factory::create_adapter;
pub use mock::{MockProvider, MockResponse};
pub use provider::{
    mask_secret, ProviderAdapter, ProviderConfig, ProviderKind, TransportPreference,
};
pub use transport::{complete_with_fallback, Transport};
pub use types::{
    ChatMessage, CompletionOptions, LlmRequest, MessageRole, TextResult, TokenUsage,
    TransportKind,
};
