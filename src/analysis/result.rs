//! Stage and run results

use super::findings::{CodeFindings, ErrorFindings, RootCauseFindings, SolutionFindings};
use crate::knowledge::SimilarBug;
use crate::llm::{ProviderError, TextResult, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// The four analysis stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Error,
    Code,
    RootCause,
    Solution,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::Error,
        StageKind::Code,
        StageKind::RootCause,
        StageKind::Solution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Error => "error",
            StageKind::Code => "code",
            StageKind::RootCause => "root_cause",
            StageKind::Solution => "solution",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage did not produce a structured payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageError {
    /// The provider answered but the reply could not be structured
    Degraded { reason: String },
    /// The provider call itself failed
    Provider { error: ProviderError },
    /// The run's deadline expired before this stage finished
    Cancelled,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Degraded { reason } => write!(f, "degraded: {}", reason),
            StageError::Provider { error } => write!(f, "provider error: {}", error),
            StageError::Cancelled => write!(f, "cancelled at deadline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StagePayload {
    Error(ErrorFindings),
    Code(CodeFindings),
    RootCause(RootCauseFindings),
    Solution(SolutionFindings),
}

/// Outcome of one stage
///
/// `success` is true only when `payload` is present. A degraded stage keeps
/// the provider's raw text; a hard failure has neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageKind,
    pub success: bool,
    pub raw_text: Option<String>,
    pub payload: Option<StagePayload>,
    pub error: Option<StageError>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl StageResult {
    /// Records a reply that parsed into `payload`
    pub fn succeeded(stage: StageKind, reply: &TextResult, payload: StagePayload) -> Self {
        Self {
            stage,
            success: true,
            raw_text: Some(reply.text.clone()),
            payload: Some(payload),
            error: None,
            latency_ms: reply.latency.as_millis() as u64,
            usage: reply.usage,
        }
    }

    /// Records a reply that could not be structured.
    ///
    /// The reply text is kept in `raw_text` so downstream stages and the
    /// similar-bug lookup can still use it.
    ///
    /// # Arguments
    ///
    /// * `stage` - Stage that produced the reply
    /// * `reply` - Provider answer, kept verbatim
    /// * `reason` - Why parsing gave up
    pub fn degraded(stage: StageKind, reply: &TextResult, reason: impl Into<String>) -> Self {
        Self {
            stage,
            success: false,
            raw_text: Some(reply.text.clone()),
            payload: None,
            error: Some(StageError::Degraded {
                reason: reason.into(),
            }),
            latency_ms: reply.latency.as_millis() as u64,
            usage: reply.usage,
        }
    }

    /// Records a provider failure that survived the client's retries
    pub fn failed(stage: StageKind, error: ProviderError, elapsed: Duration) -> Self {
        Self {
            stage,
            success: false,
            raw_text: None,
            payload: None,
            error: Some(StageError::Provider { error }),
            latency_ms: elapsed.as_millis() as u64,
            usage: None,
        }
    }

    /// Records a stage dropped when the run deadline expired
    pub fn cancelled(stage: StageKind) -> Self {
        Self {
            stage,
            success: false,
            raw_text: None,
            payload: None,
            error: Some(StageError::Cancelled),
            latency_ms: 0,
            usage: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.error, Some(StageError::Degraded { .. }))
    }

    /// Parsed Error stage output, if this result carries one
    pub fn error_findings(&self) -> Option<&ErrorFindings> {
        match &self.payload {
            Some(StagePayload::Error(findings)) => Some(findings),
            _ => None,
        }
    }

    pub fn code_findings(&self) -> Option<&CodeFindings> {
        match &self.payload {
            Some(StagePayload::Code(findings)) => Some(findings),
            _ => None,
        }
    }

    pub fn root_cause_findings(&self) -> Option<&RootCauseFindings> {
        match &self.payload {
            Some(StagePayload::RootCause(findings)) => Some(findings),
            _ => None,
        }
    }

    pub fn solution_findings(&self) -> Option<&SolutionFindings> {
        match &self.payload {
            Some(StagePayload::Solution(findings)) => Some(findings),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every executed stage succeeded
    Complete,
    /// At least one stage succeeded and at least one did not
    Partial,
    /// No stage succeeded
    Failed,
}

impl RunStatus {
    /// Derives the run status from the executed stages.
    ///
    /// An empty slice counts as a failed run.
    ///
    /// # Example
    ///
    /// ```
    /// use debuglens::analysis::{RunStatus, StageKind, StageResult};
    ///
    /// let results = [StageResult::cancelled(StageKind::Solution)];
    /// assert_eq!(RunStatus::from_results(&results), RunStatus::Failed);
    /// assert_eq!(RunStatus::from_results(&[]), RunStatus::Failed);
    /// ```
    pub fn from_results(results: &[StageResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        if succeeded == 0 {
            RunStatus::Failed
        } else if succeeded == results.len() {
            RunStatus::Complete
        } else {
            RunStatus::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Complete => "complete",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short human-oriented digest of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub problem_identified: bool,
    pub root_cause_identified: bool,
    pub solution_provided: bool,
    pub key_findings: Vec<String>,
    pub recommendation: Option<String>,
    pub degraded_stages: Vec<StageKind>,
}

impl AnalysisSummary {
    /// Collects the headline of each successful stage.
    ///
    /// # Arguments
    ///
    /// * `results` - Stage results of the run, in any order
    /// * `similar_bugs` - Knowledge-base matches, mentioned in the recommendation
    pub fn build(results: &[StageResult], similar_bugs: &[SimilarBug]) -> Self {
        let find = |kind: StageKind| results.iter().find(|r| r.stage == kind);

        let error = find(StageKind::Error).and_then(StageResult::error_findings);
        let code = find(StageKind::Code).and_then(StageResult::code_findings);
        let root = find(StageKind::RootCause).and_then(StageResult::root_cause_findings);
        let solution = find(StageKind::Solution).and_then(StageResult::solution_findings);

        let mut key_findings = Vec::new();
        if let Some(error) = error {
            match &error.category {
                Some(category) => {
                    key_findings.push(format!("Error ({}): {}", category, error.cause))
                }
                None => key_findings.push(format!("Error: {}", error.cause)),
            }
        }
        if let Some(code) = code {
            if !code.potential_bugs.is_empty() {
                key_findings.push(format!(
                    "{} potential bug(s) found in {} code",
                    code.potential_bugs.len(),
                    code.language
                ));
            }
        }
        if let Some(root) = root {
            key_findings.push(format!("Root cause: {}", root.cause));
        }
        if let Some(best) = similar_bugs.first() {
            key_findings.push(format!(
                "Similar known bug {} ({:.0}% match): {}",
                best.id,
                best.similarity_score * 100.0,
                best.summary
            ));
        }

        Self {
            problem_identified: error.is_some() || code.is_some(),
            root_cause_identified: root.is_some(),
            solution_provided: solution.is_some(),
            key_findings,
            recommendation: solution.map(|s| s.summary.clone()),
            degraded_stages: results
                .iter()
                .filter(|r| r.is_degraded())
                .map(|r| r.stage)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Stages in the order they completed
    pub stages_run: Vec<StageKind>,
    pub provider: String,
}

/// Merged output of one engine run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedAnalysis {
    /// Stage results in completion order
    pub stages: Vec<StageResult>,
    pub similar_bugs: Vec<SimilarBug>,
    pub status: RunStatus,
    pub summary: AnalysisSummary,
    pub metadata: RunMetadata,
}

impl CombinedAnalysis {
    /// Result of the given stage, or `None` when it was not applicable
    pub fn stage(&self, kind: StageKind) -> Option<&StageResult> {
        self.stages.iter().find(|r| r.stage == kind)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|r| r.stage.as_str()).collect()
    }
}
