//! Structured payloads produced by each stage
//!
//! Each `*Findings` type has a `from_reply` constructor that accepts the raw
//! model text and fails with [`ReplyError`] when the reply cannot be turned
//! into the stage's required fields. Stages keep the raw text either way.

use super::heuristics::{CauseScores, ErrorHints};
use super::quality::{improvement_suggestions, CodeQuality, CodeSignals, Rating, Suggestion};
use super::response::{
    lenient_string_list, lenient_text, normalize_confidence, parse_reply, require, value_as_line,
    value_as_text, ReplyError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFindings {
    pub category: Option<String>,
    pub severity: Option<String>,
    pub cause: String,
    pub confidence: Option<f32>,
    pub affected_components: Vec<String>,
    pub common_triggers: Vec<String>,
    /// Pattern-table results, present even when the model ignored them
    pub rule_hints: ErrorHints,
}

#[derive(Deserialize)]
struct ErrorReply {
    #[serde(default, deserialize_with = "lenient_text")]
    category: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    severity: Option<String>,
    #[serde(default, alias = "root_cause_summary", deserialize_with = "lenient_text")]
    cause: Option<String>,
    #[serde(default)]
    confidence: Value,
    #[serde(default, deserialize_with = "lenient_string_list")]
    affected_components: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    common_triggers: Vec<String>,
}

impl ErrorFindings {
    pub fn from_reply(text: &str, rule_hints: ErrorHints) -> Result<Self, ReplyError> {
        let reply: ErrorReply = parse_reply(text)?;
        Ok(Self {
            cause: require("cause", reply.cause)?,
            category: reply.category,
            severity: reply.severity.map(|s| s.to_lowercase()),
            confidence: normalize_confidence(&reply.confidence),
            affected_components: reply.affected_components,
            common_triggers: reply.common_triggers,
            rule_hints,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeIssue {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

impl CodeIssue {
    fn from_value(value: &Value) -> Option<Self> {
        let description = value_as_text(value)?;
        let (line, severity) = match value {
            Value::Object(map) => (
                map.get("line").and_then(value_as_line),
                map.get("severity").and_then(value_as_text),
            ),
            _ => (None, None),
        };
        Some(Self {
            description,
            line,
            severity,
        })
    }
}

/// Security weakness spotted in the snippet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConcern {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mitigation: Option<String>,
}

impl SecurityConcern {
    fn from_value(value: &Value) -> Option<Self> {
        let (description, severity, mitigation) = match value {
            Value::Object(map) => (
                map.get("description")
                    .or_else(|| map.get("vulnerability"))
                    .and_then(value_as_text)?,
                map.get("severity").and_then(value_as_text),
                map.get("mitigation").and_then(value_as_text),
            ),
            other => (value_as_text(other)?, None, None),
        };
        Some(Self {
            description,
            severity,
            mitigation,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeFindings {
    pub language: String,
    pub potential_bugs: Vec<CodeIssue>,
    pub quality_issues: Vec<String>,
    pub security_concerns: Vec<SecurityConcern>,
    pub summary: Option<String>,
    /// Rule-based verdict derived from the ratings and findings above
    pub quality: CodeQuality,
    pub improvement_suggestions: Vec<Suggestion>,
}

#[derive(Deserialize)]
struct CodeReply {
    #[serde(default, deserialize_with = "lenient_text")]
    language: Option<String>,
    #[serde(default, alias = "bugs")]
    potential_bugs: Value,
    #[serde(default, deserialize_with = "lenient_string_list")]
    quality_issues: Vec<String>,
    #[serde(default, alias = "security_issues")]
    security_concerns: Value,
    #[serde(default, deserialize_with = "lenient_text")]
    summary: Option<String>,
    #[serde(default, alias = "complexity")]
    complexity_score: Value,
    #[serde(default, alias = "structure")]
    structure_quality: Value,
    #[serde(default)]
    naming_consistent: Value,
    #[serde(default)]
    indentation_consistent: Value,
    #[serde(default, alias = "comments")]
    comment_quality: Value,
}

fn collect_items<T>(value: &Value, parse: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    match value {
        Value::Array(items) => items.iter().filter_map(parse).collect(),
        Value::Null => Vec::new(),
        other => parse(other).into_iter().collect(),
    }
}

impl CodeFindings {
    /// `detected_language` is used when the model omits or blanks the field
    pub fn from_reply(text: &str, detected_language: &str) -> Result<Self, ReplyError> {
        let reply: CodeReply = parse_reply(text)?;

        let potential_bugs = collect_items(&reply.potential_bugs, CodeIssue::from_value);
        let security_concerns = collect_items(&reply.security_concerns, SecurityConcern::from_value);

        if reply.summary.is_none()
            && potential_bugs.is_empty()
            && reply.quality_issues.is_empty()
            && security_concerns.is_empty()
        {
            return Err(ReplyError::MissingField("summary".to_string()));
        }

        let signals = CodeSignals {
            complexity: CodeSignals::complexity_from_value(&reply.complexity_score),
            structure: Rating::from_value(&reply.structure_quality),
            naming_consistent: CodeSignals::flag_from_value(&reply.naming_consistent),
            indentation_consistent: CodeSignals::flag_from_value(&reply.indentation_consistent),
            comments: Rating::from_value(&reply.comment_quality),
        };
        let quality = CodeQuality::assess(
            signals,
            &potential_bugs,
            &security_concerns,
            &reply.quality_issues,
        );
        let improvement_suggestions =
            improvement_suggestions(&potential_bugs, &security_concerns, &reply.quality_issues);

        Ok(Self {
            language: reply
                .language
                .filter(|l| !l.eq_ignore_ascii_case("unknown"))
                .unwrap_or_else(|| detected_language.to_string()),
            potential_bugs,
            quality_issues: reply.quality_issues,
            security_concerns,
            summary: reply.summary,
            quality,
            improvement_suggestions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseFindings {
    pub cause: String,
    pub confidence: Option<f32>,
    pub category: Option<String>,
    pub causal_chain: Vec<String>,
    pub explanation: Option<String>,
    pub evidence: Vec<String>,
    /// Rule-based category prior the prompt was seeded with
    pub cause_scores: CauseScores,
}

#[derive(Deserialize)]
struct RootCauseReply {
    #[serde(default, alias = "root_cause", deserialize_with = "lenient_text")]
    cause: Option<String>,
    #[serde(default)]
    confidence: Value,
    #[serde(default, alias = "problem_type", deserialize_with = "lenient_text")]
    category: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    causal_chain: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    explanation: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    evidence: Vec<String>,
}

impl RootCauseFindings {
    pub fn from_reply(text: &str, cause_scores: CauseScores) -> Result<Self, ReplyError> {
        let reply: RootCauseReply = parse_reply(text)?;
        Ok(Self {
            cause: require("cause", reply.cause)?,
            confidence: normalize_confidence(&reply.confidence),
            category: reply
                .category
                .or_else(|| cause_scores.dominant().map(str::to_string)),
            causal_chain: reply.causal_chain,
            explanation: reply.explanation,
            evidence: reply.evidence,
            cause_scores,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    pub fixed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Deserialize)]
struct CodeChangeReply {
    #[serde(default, alias = "before", deserialize_with = "lenient_text")]
    original: Option<String>,
    #[serde(default, alias = "after", alias = "code", deserialize_with = "lenient_text")]
    fixed: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionFindings {
    pub summary: String,
    pub fix_steps: Vec<String>,
    pub code_changes: Vec<CodeChange>,
    pub prevention_tips: Vec<String>,
    pub alternatives: Vec<String>,
}

#[derive(Deserialize)]
struct SolutionReply {
    #[serde(default, alias = "solution", deserialize_with = "lenient_text")]
    summary: Option<String>,
    #[serde(default, alias = "steps", deserialize_with = "lenient_string_list")]
    fix_steps: Vec<String>,
    #[serde(default)]
    code_changes: Vec<Value>,
    #[serde(default, alias = "prevention", deserialize_with = "lenient_string_list")]
    prevention_tips: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    alternatives: Vec<String>,
}

impl SolutionFindings {
    pub fn from_reply(text: &str) -> Result<Self, ReplyError> {
        let reply: SolutionReply = parse_reply(text)?;

        let code_changes = reply
            .code_changes
            .into_iter()
            .filter_map(|value| serde_json::from_value::<CodeChangeReply>(value).ok())
            .filter_map(|change| {
                Some(CodeChange {
                    fixed: change.fixed?,
                    original: change.original,
                    explanation: change.explanation,
                })
            })
            .collect();

        let summary = match reply.summary {
            Some(summary) => summary,
            // A reply with steps but no summary is still usable
            None => reply
                .fix_steps
                .first()
                .cloned()
                .ok_or_else(|| ReplyError::MissingField("summary".to_string()))?,
        };

        Ok(Self {
            summary,
            fix_steps: reply.fix_steps,
            code_changes,
            prevention_tips: reply.prevention_tips,
            alternatives: reply.alternatives,
        })
    }
}
