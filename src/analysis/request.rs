//! Analysis input

use super::error::ValidationError;
use serde::{Deserialize, Serialize};

/// What the user wants analyzed
///
/// All four fields are optional but at least one must carry text. Blank
/// strings are normalized to `None` on construction so the emptiness check
/// and stage applicability see the same thing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawAnalysisRequest")]
pub struct AnalysisRequest {
    error_message: Option<String>,
    code_snippet: Option<String>,
    problem_description: Option<String>,
    log_info: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAnalysisRequest {
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    code_snippet: Option<String>,
    #[serde(default)]
    problem_description: Option<String>,
    #[serde(default)]
    log_info: Option<String>,
}

impl From<RawAnalysisRequest> for AnalysisRequest {
    fn from(raw: RawAnalysisRequest) -> Self {
        Self {
            error_message: non_blank(raw.error_message),
            code_snippet: non_blank(raw.code_snippet),
            problem_description: non_blank(raw.problem_description),
            log_info: non_blank(raw.log_info),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AnalysisRequest {
    pub fn builder() -> AnalysisRequestBuilder {
        AnalysisRequestBuilder::default()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn code_snippet(&self) -> Option<&str> {
        self.code_snippet.as_deref()
    }

    pub fn problem_description(&self) -> Option<&str> {
        self.problem_description.as_deref()
    }

    pub fn log_info(&self) -> Option<&str> {
        self.log_info.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.error_message.is_none()
            && self.code_snippet.is_none()
            && self.problem_description.is_none()
            && self.log_info.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Err(ValidationError::EmptyRequest)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
pub struct AnalysisRequestBuilder {
    raw: RawAnalysisRequest,
}

impl AnalysisRequestBuilder {
    pub fn error_message(mut self, value: impl Into<String>) -> Self {
        self.raw.error_message = Some(value.into());
        self
    }

    pub fn code_snippet(mut self, value: impl Into<String>) -> Self {
        self.raw.code_snippet = Some(value.into());
        self
    }

    pub fn problem_description(mut self, value: impl Into<String>) -> Self {
        self.raw.problem_description = Some(value.into());
        self
    }

    pub fn log_info(mut self, value: impl Into<String>) -> Self {
        self.raw.log_info = Some(value.into());
        self
    }

    /// Builds the request without validating it; the engine validates on entry
    pub fn build(self) -> AnalysisRequest {
        AnalysisRequest::from(self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_request_rejected() {
        let request = AnalysisRequest::builder().build();
        assert!(request.is_empty());
        assert_eq!(request.validate(), Err(ValidationError::EmptyRequest));
    }

    #[test]
    fn test_blank_fields_are_normalized() {
        let request = AnalysisRequest::builder()
            .error_message("   ")
            .code_snippet("\n\t")
            .build();
        assert!(request.error_message().is_none());
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_single_field_is_enough() {
        let request = AnalysisRequest::builder()
            .log_info("2024-01-01 ERROR disk full")
            .build();
        assert!(request.validate().is_ok());
        assert_eq!(request.log_info(), Some("2024-01-01 ERROR disk full"));
    }

    #[test]
    fn test_deserialize_normalizes() {
        let request: AnalysisRequest = serde_json::from_str(
            r#"{"error_message": "", "problem_description": "login fails"}"#,
        )
        .unwrap();
        assert!(request.error_message().is_none());
        assert_eq!(request.problem_description(), Some("login fails"));
    }
}
