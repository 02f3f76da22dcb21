//! Stage analyzers
//!
//! Each analyzer turns the request (plus upstream stage results and the
//! session history) into one [`StageResult`]. Analyzers never return errors:
//! provider failures and unusable replies are recorded in the result so the
//! engine can apply its partial-failure policy.

mod code;
mod error;
mod root_cause;
mod solution;

pub use code::CodeAnalyzer;
pub use error::ErrorAnalyzer;
pub use root_cause::RootCauseAnalyzer;
pub use solution::SolutionAnalyzer;

use super::prompts::RenderedPrompt;
use super::request::AnalysisRequest;
use super::response::ReplyError;
use super::result::{StageKind, StagePayload, StageResult};
use crate::llm::{AskOverrides, LlmClient, LlmRequest};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, warn};

const NOT_AVAILABLE: &str = "Not available.";
const NOT_PROVIDED: &str = "Not provided.";
const UNSTRUCTURED_NOTES_CHARS: usize = 1500;

/// Inputs visible to a stage
#[derive(Debug, Clone)]
pub struct StageContext<'a> {
    pub request: &'a AnalysisRequest,
    /// Formatted turns of the enclosing conversation, oldest first
    pub history: &'a str,
    /// Completed results of the stages this one depends on
    pub upstream: Vec<StageResult>,
}

impl<'a> StageContext<'a> {
    pub fn new(request: &'a AnalysisRequest, history: &'a str) -> Self {
        Self {
            request,
            history,
            upstream: Vec::new(),
        }
    }

    pub fn with_upstream(mut self, upstream: Vec<StageResult>) -> Self {
        self.upstream = upstream;
        self
    }

    pub fn dependency(&self, kind: StageKind) -> Option<&StageResult> {
        self.upstream.iter().find(|r| r.stage == kind)
    }

    /// Most recent part of the history, at most `max_chars` characters
    pub fn history_tail(&self, max_chars: usize) -> &'a str {
        let history = self.history.trim();
        if history.is_empty() {
            return "None.";
        }
        let count = history.chars().count();
        if count <= max_chars {
            return history;
        }
        let skip = count - max_chars;
        match history.char_indices().nth(skip) {
            Some((index, _)) => &history[index..],
            None => history,
        }
    }
}

#[async_trait]
pub trait StageAnalyzer: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn analyze(&self, context: &StageContext<'_>) -> StageResult;
}

/// Sends the rendered prompt and structures the reply
pub(crate) async fn run_stage<F>(
    client: &LlmClient,
    kind: StageKind,
    prompt: RenderedPrompt,
    overrides: &AskOverrides,
    parse: F,
) -> StageResult
where
    F: FnOnce(&str) -> Result<StagePayload, ReplyError> + Send,
{
    let start = Instant::now();
    let request = LlmRequest::new(prompt.user)
        .with_system(prompt.system)
        .with_purpose(kind.as_str());

    debug!(stage = %kind, "Running analysis stage");

    match client.ask(&request, overrides).await {
        Ok(reply) => match parse(&reply.text) {
            Ok(payload) => StageResult::succeeded(kind, &reply, payload),
            Err(e) => {
                warn!(stage = %kind, error = %e, "Stage reply could not be structured");
                StageResult::degraded(kind, &reply, e.to_string())
            }
        },
        Err(e) => {
            warn!(stage = %kind, error = %e, "Stage provider call failed");
            StageResult::failed(kind, e, start.elapsed())
        }
    }
}

/// Renders an upstream result as prompt context.
///
/// Structured payloads are summarized; a degraded stage contributes its raw
/// reply as unstructured notes; a failed or missing stage is reported as
/// unavailable.
pub(crate) fn describe_dependency(result: Option<&StageResult>) -> String {
    let Some(result) = result else {
        return NOT_AVAILABLE.to_string();
    };

    if let Some(payload) = &result.payload {
        return describe_payload(payload);
    }

    match &result.raw_text {
        Some(raw) => {
            let notes: String = raw.chars().take(UNSTRUCTURED_NOTES_CHARS).collect();
            format!("Unstructured notes: {}", notes)
        }
        None => NOT_AVAILABLE.to_string(),
    }
}

fn describe_payload(payload: &StagePayload) -> String {
    let mut lines = Vec::new();
    match payload {
        StagePayload::Error(f) => {
            if let Some(category) = &f.category {
                lines.push(format!("Category: {}", category));
            }
            if let Some(severity) = &f.severity {
                lines.push(format!("Severity: {}", severity));
            }
            lines.push(format!("Cause: {}", f.cause));
            if !f.affected_components.is_empty() {
                lines.push(format!(
                    "Affected components: {}",
                    f.affected_components.join(", ")
                ));
            }
            if !f.rule_hints.is_empty() {
                lines.push(format!("Pattern match: {}", f.rule_hints.describe()));
            }
        }
        StagePayload::Code(f) => {
            lines.push(format!("Language: {}", f.language));
            if !f.potential_bugs.is_empty() {
                lines.push("Potential bugs:".to_string());
                for bug in &f.potential_bugs {
                    match bug.line {
                        Some(line) => lines.push(format!("- {} (line {})", bug.description, line)),
                        None => lines.push(format!("- {}", bug.description)),
                    }
                }
            }
            if !f.security_concerns.is_empty() {
                lines.push("Security concerns:".to_string());
                for concern in &f.security_concerns {
                    lines.push(format!("- {}", concern.description));
                }
            }
            lines.push(format!("Quality score: {}/10", f.quality.score));
            if let Some(summary) = &f.summary {
                lines.push(format!("Summary: {}", summary));
            }
        }
        StagePayload::RootCause(f) => {
            lines.push(format!("Cause: {}", f.cause));
            if let Some(category) = &f.category {
                lines.push(format!("Category: {}", category));
            }
            if !f.causal_chain.is_empty() {
                lines.push(format!("Causal chain: {}", f.causal_chain.join(" -> ")));
            }
            if let Some(explanation) = &f.explanation {
                lines.push(format!("Explanation: {}", explanation));
            }
        }
        StagePayload::Solution(f) => {
            lines.push(format!("Fix: {}", f.summary));
            for (i, step) in f.fix_steps.iter().enumerate() {
                lines.push(format!("{}. {}", i + 1, step));
            }
        }
    }
    lines.join("\n")
}

fn or_not_provided(value: Option<&str>) -> &str {
    value.unwrap_or(NOT_PROVIDED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ProviderError, TextResult, TransportKind};
    use std::time::Duration;

    #[test]
    fn test_history_tail_keeps_most_recent() {
        let request = AnalysisRequest::builder().error_message("x").build();
        let context = StageContext::new(&request, "turn one | turn two");
        assert_eq!(context.history_tail(8), "turn two");
        assert_eq!(context.history_tail(100), "turn one | turn two");
    }

    #[test]
    fn test_history_tail_empty() {
        let request = AnalysisRequest::builder().error_message("x").build();
        let context = StageContext::new(&request, "  ");
        assert_eq!(context.history_tail(10), "None.");
    }

    #[test]
    fn test_absent_request_fields_render_as_not_provided() {
        let request = AnalysisRequest::builder().error_message("boom").build();
        let template = crate::analysis::prompts::StageTemplate::new(
            "",
            "Error: {error_message}\nProblem: {problem_description}",
        );
        let prompt = template.render(&[
            ("error_message", or_not_provided(request.error_message())),
            (
                "problem_description",
                or_not_provided(request.problem_description()),
            ),
        ]);
        assert_eq!(prompt.user, "Error: boom\nProblem: Not provided.");
    }

    #[test]
    fn test_describe_dependency_variants() {
        assert_eq!(describe_dependency(None), NOT_AVAILABLE);

        let failed = StageResult::failed(
            StageKind::Code,
            ProviderError::Timeout { timeout_ms: 1000 },
            Duration::ZERO,
        );
        assert_eq!(describe_dependency(Some(&failed)), NOT_AVAILABLE);

        let reply = TextResult::new("plain words", TransportKind::InProcess, Duration::ZERO);
        let degraded = StageResult::degraded(StageKind::Code, &reply, "Invalid JSON");
        assert_eq!(
            describe_dependency(Some(&degraded)),
            "Unstructured notes: plain words"
        );
    }
}
