//! Similar-bug lookup against an external knowledge base
//!
//! The engine treats the knowledge base as optional enrichment: any failure
//! is logged and yields an empty list.

use crate::analysis::{AnalysisRequest, StageResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_KB_ENDPOINT: &str = "http://localhost:8000/query";
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.75;
pub const MAX_QUERY_CHARS: usize = 1000;
const MAX_RAW_PART_CHARS: usize = 400;

/// A previously recorded bug resembling the current one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarBug {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(alias = "title", alias = "description", default)]
    pub summary: String,
    #[serde(alias = "similarity", alias = "score", default)]
    pub similarity_score: f32,
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "bug id must be a string or number, got {}",
            other
        ))),
    }
}

#[derive(Debug, Error)]
pub enum KnowledgeBaseError {
    #[error("knowledge base unavailable: {0}")]
    Unavailable(String),
    #[error("knowledge base returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn find_similar(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarBug>, KnowledgeBaseError>;
}

/// Knowledge base reached over a JSON `POST {query, top_k, threshold}` API
pub struct HttpKnowledgeBase {
    endpoint: String,
    threshold: f32,
    http_client: Client,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    top_k: usize,
    threshold: f32,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<SimilarBug>,
}

impl HttpKnowledgeBase {
    pub fn new(
        endpoint: impl Into<String>,
        threshold: f32,
        timeout: Duration,
    ) -> Result<Self, KnowledgeBaseError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KnowledgeBaseError::Unavailable(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            threshold,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl KnowledgeBase for HttpKnowledgeBase {
    async fn find_similar(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarBug>, KnowledgeBaseError> {
        debug!(endpoint = %self.endpoint, top_k, "Querying knowledge base");

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&QueryBody {
                query,
                top_k,
                threshold: self.threshold,
            })
            .send()
            .await
            .map_err(|e| KnowledgeBaseError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KnowledgeBaseError::Unavailable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| KnowledgeBaseError::Unavailable(e.to_string()))?;
        parse_results(&body, top_k)
    }
}

impl fmt::Debug for HttpKnowledgeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpKnowledgeBase")
            .field("endpoint", &self.endpoint)
            .field("threshold", &self.threshold)
            .finish()
    }
}

/// Parses a result list, best match first, at most `top_k` entries
pub fn parse_results(body: &str, top_k: usize) -> Result<Vec<SimilarBug>, KnowledgeBaseError> {
    let response: QueryResponse = serde_json::from_str(body)
        .map_err(|e| KnowledgeBaseError::InvalidResponse(e.to_string()))?;
    let mut results = response.results;
    results.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    results.truncate(top_k);
    Ok(results)
}

/// Builds the similarity query from stage output, falling back to the raw
/// request. Returns `None` when there is nothing to search for.
pub fn composite_query(
    request: &AnalysisRequest,
    error: Option<&StageResult>,
    root_cause: Option<&StageResult>,
) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    match error.and_then(StageResult::error_findings) {
        Some(findings) => {
            if let Some(error_type) = &findings.rule_hints.error_type {
                parts.push(error_type.clone());
            }
            parts.push(findings.cause.clone());
        }
        None => {
            if let Some(raw) = degraded_text(error) {
                parts.push(raw);
            } else if let Some(message) = request.error_message() {
                parts.push(message.to_string());
            }
        }
    }

    match root_cause.and_then(StageResult::root_cause_findings) {
        Some(findings) => parts.push(findings.cause.clone()),
        None => {
            if let Some(raw) = degraded_text(root_cause) {
                parts.push(raw);
            } else if let Some(description) = request.problem_description() {
                parts.push(description.to_string());
            }
        }
    }

    if parts.is_empty() {
        if let Some(code) = request.code_snippet() {
            parts.push(code.chars().take(500).collect());
        }
    }

    let query: String = parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_QUERY_CHARS)
        .collect();

    (!query.is_empty()).then_some(query)
}

/// Reply text of a stage that answered but could not be parsed
fn degraded_text(stage: Option<&StageResult>) -> Option<String> {
    let raw = stage?.raw_text.as_deref()?.trim();
    (!raw.is_empty()).then(|| raw.chars().take(MAX_RAW_PART_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StageKind;
    use crate::llm::{TextResult, TransportKind};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_results_sorts_and_truncates() {
        let body = r#"{"results": [
            {"id": 7, "title": "Null user in session", "similarity": 0.81},
            {"id": "BUG-2", "summary": "Division by zero in report", "similarity_score": 0.93},
            {"id": "BUG-3", "summary": "Other", "similarity_score": 0.77}
        ]}"#;

        let results = parse_results(body, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "BUG-2");
        assert_eq!(results[1].id, "7");
        assert_eq!(results[1].summary, "Null user in session");
    }

    #[test]
    fn test_parse_results_missing_list() {
        assert!(parse_results("{}", 5).unwrap().is_empty());
        assert!(parse_results("not json", 5).is_err());
    }

    #[test]
    fn test_composite_query_falls_back_to_request() {
        let request = AnalysisRequest::builder()
            .error_message("ZeroDivisionError:   division by zero")
            .problem_description("report page crashes")
            .build();
        let query = composite_query(&request, None, None).unwrap();
        assert_eq!(
            query,
            "ZeroDivisionError: division by zero report page crashes"
        );
    }

    #[test]
    fn test_composite_query_uses_degraded_reply_text() {
        let request = AnalysisRequest::builder()
            .error_message("ZeroDivisionError: division by zero")
            .problem_description("report page crashes")
            .build();
        let reply = |text: &str| TextResult::new(text, TransportKind::Http, Duration::ZERO);
        let error = StageResult::degraded(
            StageKind::Error,
            &reply("The divisor is zero because the list is empty."),
            "no JSON object",
        );
        let root_cause = StageResult::degraded(
            StageKind::RootCause,
            &reply("Empty report filter"),
            "no JSON object",
        );

        let query = composite_query(&request, Some(&error), Some(&root_cause)).unwrap();
        assert_eq!(
            query,
            "The divisor is zero because the list is empty. Empty report filter"
        );
    }

    #[test]
    fn test_composite_query_hard_failure_falls_back_to_request() {
        let request = AnalysisRequest::builder()
            .error_message("KeyError: 'id'")
            .build();
        let error = StageResult::failed(
            StageKind::Error,
            crate::llm::ProviderError::Unavailable {
                message: "503".into(),
            },
            Duration::ZERO,
        );
        assert_eq!(
            composite_query(&request, Some(&error), None).as_deref(),
            Some("KeyError: 'id'")
        );
    }

    #[test]
    fn test_composite_query_is_capped() {
        let request = AnalysisRequest::builder()
            .error_message("x".repeat(5000))
            .build();
        let query = composite_query(&request, None, None).unwrap();
        assert_eq!(query.chars().count(), MAX_QUERY_CHARS);
    }

    #[test]
    fn test_composite_query_uses_code_as_last_resort() {
        let request = AnalysisRequest::builder().code_snippet("let x = 1 / 0;").build();
        assert_eq!(
            composite_query(&request, None, None).as_deref(),
            Some("let x = 1 / 0;")
        );
    }

    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "{}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/query", addr)
    }

    #[tokio::test]
    async fn test_http_knowledge_base_round_trip() {
        let url = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"results": [{"id": "BUG-1", "summary": "Divide by zero", "similarity_score": 0.9}]}"#,
        )
        .await;

        let kb = HttpKnowledgeBase::new(url, 0.75, Duration::from_secs(5)).unwrap();
        let results = kb.find_similar("division by zero", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "BUG-1");
    }

    #[tokio::test]
    async fn test_http_knowledge_base_error_status() {
        let url = serve_once("HTTP/1.1 500 Internal Server Error", "{}").await;
        let kb = HttpKnowledgeBase::new(url, 0.75, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            kb.find_similar("q", 5).await,
            Err(KnowledgeBaseError::Unavailable(_))
        ));
    }
}
