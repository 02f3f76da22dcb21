//! Rule-based code quality scoring
//!
//! The code stage asks the model for a few structural ratings alongside its
//! bug list. [`CodeQuality::assess`] folds those ratings and the issue counts
//! into a 1-10 score with strengths, weaknesses and ordered improvement
//! suggestions. No extra model call is made.

use super::findings::{CodeIssue, SecurityConcern};
use super::response::value_as_text;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MAX_SUGGESTIONS: usize = 10;

/// Structural ratings reported by the model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSignals {
    /// 1 (trivial) to 10 (very complex)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub naming_consistent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indentation_consistent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Rating>,
}

/// Three-step rating used for structure and comment quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Good,
    Fair,
    Poor,
}

impl Rating {
    pub fn from_value(value: &Value) -> Option<Self> {
        let text = value_as_text(value)?.to_lowercase();
        match text.as_str() {
            "good" | "excellent" | "clear" | "high" => Some(Rating::Good),
            "fair" | "average" | "ok" | "medium" | "moderate" => Some(Rating::Fair),
            "poor" | "bad" | "lacking" | "missing" | "none" | "low" => Some(Rating::Poor),
            _ => None,
        }
    }
}

impl CodeSignals {
    /// Reads a complexity value given as a number or numeric string, clamped to 1-10
    pub fn complexity_from_value(value: &Value) -> Option<u8> {
        let raw = match value {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        Some(raw.round().clamp(1.0, 10.0) as u8)
    }

    pub fn flag_from_value(value: &Value) -> Option<bool> {
        match value {
            Value::Bool(b) => Some(*b),
            other => match value_as_text(other)?.to_lowercase().as_str() {
                "true" | "yes" | "consistent" => Some(true),
                "false" | "no" | "inconsistent" => Some(false),
                _ => None,
            },
        }
    }
}

/// One actionable improvement, tagged with the area it concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub area: String,
    pub description: String,
    pub suggestion: String,
}

/// Overall quality verdict for a snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeQuality {
    /// 1 (poor) to 10 (excellent)
    pub score: u8,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub signals: CodeSignals,
}

impl CodeQuality {
    /// Scores a snippet from its ratings and findings.
    ///
    /// Starts at 5. Complexity above 5 costs 0.3 per point (below 5 earns
    /// the same). Good structure adds 1 and poor structure subtracts 1.
    /// Consistent naming, consistent indentation and good comments add 0.5
    /// each. Every high-severity bug or security concern costs 0.8, and
    /// every reported bug or concern costs a further 0.2. The result is
    /// rounded and clamped to 1-10.
    ///
    /// # Example
    ///
    /// ```
    /// use debuglens::analysis::quality::{CodeQuality, CodeSignals};
    ///
    /// let quality = CodeQuality::assess(CodeSignals::default(), &[], &[], &[]);
    /// assert_eq!(quality.score, 5);
    /// ```
    pub fn assess(
        signals: CodeSignals,
        bugs: &[CodeIssue],
        security: &[SecurityConcern],
        quality_issues: &[String],
    ) -> Self {
        let mut score = 5.0_f32;

        let complexity = signals.complexity.unwrap_or(5);
        score -= (complexity as f32 - 5.0) * 0.3;

        match signals.structure {
            Some(Rating::Good) => score += 1.0,
            Some(Rating::Poor) => score -= 1.0,
            _ => {}
        }
        if signals.naming_consistent == Some(true) {
            score += 0.5;
        }
        if signals.indentation_consistent == Some(true) {
            score += 0.5;
        }
        if signals.comments == Some(Rating::Good) {
            score += 0.5;
        }

        let severe = bugs.iter().filter(|b| is_high(b.severity.as_deref())).count()
            + security
                .iter()
                .filter(|c| is_high(c.severity.as_deref()))
                .count();
        score -= severe as f32 * 0.8;
        score -= (bugs.len() + security.len()) as f32 * 0.2;

        let score = score.round().clamp(1.0, 10.0) as u8;

        Self {
            score,
            summary: summary_for(score).to_string(),
            strengths: strengths(&signals, bugs, security),
            weaknesses: weaknesses(&signals, bugs, security, quality_issues),
            signals,
        }
    }
}

fn is_high(severity: Option<&str>) -> bool {
    matches!(
        severity.map(|s| s.trim().to_lowercase()).as_deref(),
        Some("high" | "critical")
    )
}

fn summary_for(score: u8) -> &'static str {
    match score {
        8..=10 => "Excellent code quality: clear structure that follows good practice.",
        6..=7 => "Good code quality with a few things to improve.",
        4..=5 => "Fair code quality; several areas need work.",
        _ => "Poor code quality; substantial refactoring is needed.",
    }
}

fn strengths(signals: &CodeSignals, bugs: &[CodeIssue], security: &[SecurityConcern]) -> Vec<String> {
    let mut out = Vec::new();
    if signals.complexity.map_or(false, |c| c <= 5) {
        out.push("Moderate complexity");
    }
    if signals.structure == Some(Rating::Good) {
        out.push("Clear structure");
    }
    if signals.naming_consistent == Some(true) {
        out.push("Consistent naming");
    }
    if signals.comments == Some(Rating::Good) {
        out.push("Well commented");
    }
    if signals.indentation_consistent == Some(true) {
        out.push("Consistent indentation");
    }
    if bugs.is_empty() && security.is_empty() {
        out.push("No obvious defects");
    }
    if out.is_empty() {
        out.push("Implements the basic functionality");
    }
    out.into_iter().map(str::to_string).collect()
}

fn weaknesses(
    signals: &CodeSignals,
    bugs: &[CodeIssue],
    security: &[SecurityConcern],
    quality_issues: &[String],
) -> Vec<String> {
    let mut out = Vec::new();
    if signals.complexity.map_or(false, |c| c > 7) {
        out.push("High complexity");
    }
    if signals.structure == Some(Rating::Poor) {
        out.push("Disorganized structure");
    }
    if signals.naming_consistent == Some(false) {
        out.push("Inconsistent naming");
    }
    if signals.comments == Some(Rating::Poor) {
        out.push("Insufficient comments");
    }
    if !bugs.is_empty() {
        out.push("Potential bugs");
    }
    if !quality_issues.is_empty() {
        out.push("Maintainability issues");
    }
    if !security.is_empty() {
        out.push("Security concerns");
    }
    out.into_iter().map(str::to_string).collect()
}

/// Security fixes first, then bugs, then general quality; at most ten
pub fn improvement_suggestions(
    bugs: &[CodeIssue],
    security: &[SecurityConcern],
    quality_issues: &[String],
) -> Vec<Suggestion> {
    let security = security.iter().map(|c| Suggestion {
        area: "security".to_string(),
        description: c.description.clone(),
        suggestion: c
            .mitigation
            .clone()
            .unwrap_or_else(|| format!("Address the security concern: {}", c.description)),
    });
    let bugs = bugs.iter().map(|b| Suggestion {
        area: "bug".to_string(),
        description: b.description.clone(),
        suggestion: format!("Fix the potential bug: {}", b.description),
    });
    let quality = quality_issues.iter().map(|issue| Suggestion {
        area: "quality".to_string(),
        description: issue.clone(),
        suggestion: format!("Improve: {}", issue),
    });

    security.chain(bugs).chain(quality).take(MAX_SUGGESTIONS).collect()
}
