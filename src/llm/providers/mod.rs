//! Vendor adapters

pub mod anthropic;
pub mod azure;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use azure::AzureAdapter;
pub use openai::OpenAiAdapter;
