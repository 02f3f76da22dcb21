//! LLM communication types
//!
//! This module defines the types used for LLM request/response communication,
//! independent of any specific provider implementation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions
    System,
    /// User message
    User,
    /// Assistant (LLM) response
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: MessageRole,
    /// Text content of the message
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Creates a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A prompt to send through the client
///
/// `purpose` is a free-form label (the analysis stages use their own name) that
/// shows up in logs and lets test doubles route responses.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    /// System instructions, sent the way each provider expects them
    pub system: Option<String>,
    /// Conversation messages, oldest first
    pub messages: Vec<ChatMessage>,
    pub purpose: Option<String>,
}

impl LlmRequest {
    /// Creates a single-turn request from a user prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            messages: vec![ChatMessage::user(prompt)],
            purpose: None,
        }
    }

    /// Creates a request from an explicit message list
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            system: None,
            messages,
            purpose: None,
        }
    }

    /// Sets the system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Labels the request
    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    /// Concatenated user-visible text, used by test doubles and diagnostics
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Generation settings resolved for one call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Budget for a single attempt
    pub timeout: Duration,
}

/// Which transport actually served a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// The provider's native client library
    Sdk,
    /// Direct HTTPS call against the provider's REST API
    Http,
    /// An in-process adapter such as the mock provider
    InProcess,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportKind::Sdk => "sdk",
            TransportKind::Http => "http",
            TransportKind::InProcess => "in_process",
        };
        f.write_str(name)
    }
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Normalized completion returned by every adapter
#[derive(Debug, Clone, PartialEq)]
pub struct TextResult {
    /// Generated text
    pub text: String,
    /// Token usage, when the provider reports it
    pub usage: Option<TokenUsage>,
    /// Wall-clock time of the successful attempt
    pub latency: Duration,
    pub transport: TransportKind,
    /// Number of attempts the client needed (1 when the first call succeeded)
    pub attempts: u32,
}

impl TextResult {
    /// Creates a result for a single attempt
    pub fn new(text: impl Into<String>, transport: TransportKind, latency: Duration) -> Self {
        Self {
            text: text.into(),
            usage: None,
            latency,
            transport,
            attempts: 1,
        }
    }

    /// Attaches token usage
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let system = ChatMessage::system("You are a debugger");
        assert_eq!(system.role, MessageRole::System);
        assert_eq!(system.content, "You are a debugger");

        let user = ChatMessage::user("What broke?");
        assert_eq!(user.role, MessageRole::User);

        let assistant = ChatMessage::assistant("A null pointer");
        assert_eq!(assistant.role, MessageRole::Assistant);
    }

    #[test]
    fn test_request_builder() {
        let request = LlmRequest::new("Explain this error")
            .with_system("Be concise")
            .with_purpose("error");

        assert_eq!(request.system.as_deref(), Some("Be concise"));
        assert_eq!(request.purpose.as_deref(), Some("error"));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.prompt_text(), "Explain this error");
    }

    #[test]
    fn test_message_role_serialization() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_usage_total() {
        let usage = TokenUsage {
            prompt_tokens: 120,
            completion_tokens: 30,
        };
        assert_eq!(usage.total(), 150);
    }
}
