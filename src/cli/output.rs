//! Output formatting for multiple formats
//!
//! JSON and YAML render the full structures; the human format is a compact
//! report meant for a terminal.

use anyhow::{Context, Result};

use crate::analysis::{CombinedAnalysis, StageKind, StagePayload, StageResult};
use crate::config::DebuglensConfig;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format
    Yaml,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_analysis(&self, analysis: &CombinedAnalysis) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(analysis)
                .context("Failed to serialize analysis to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(analysis).context("Failed to serialize analysis to YAML")
            }
            OutputFormat::Human => Ok(format_analysis_human(analysis)),
        }
    }

    /// Callers pass an already masked configuration
    pub fn format_config(&self, config: &DebuglensConfig) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(config)
                .context("Failed to serialize configuration to YAML"),
            OutputFormat::Human => Ok(config.to_string()),
        }
    }
}

fn format_analysis_human(analysis: &CombinedAnalysis) -> String {
    let mut output = String::new();

    let marker = match analysis.status {
        crate::analysis::RunStatus::Complete => "\u{2713}",
        _ => "\u{26A0}",
    };
    output.push_str(&format!(
        "{} Bug Analysis ({})\n{}\n\n",
        marker, analysis.status, RULE
    ));

    for result in &analysis.stages {
        output.push_str(&format_stage(result));
        output.push('\n');
    }

    if !analysis.similar_bugs.is_empty() {
        output.push_str("Similar Bugs:\n");
        for bug in &analysis.similar_bugs {
            output.push_str(&format!(
                "  - {} ({:.0}%): {}\n",
                bug.id,
                bug.similarity_score * 100.0,
                bug.summary
            ));
        }
        output.push('\n');
    }

    let summary = &analysis.summary;
    if !summary.key_findings.is_empty() {
        output.push_str("Key Findings:\n");
        for finding in &summary.key_findings {
            output.push_str(&format!("  - {}\n", finding));
        }
    }
    if let Some(recommendation) = &summary.recommendation {
        output.push_str(&format!("\nRecommendation: {}\n", recommendation));
    }
    if !summary.degraded_stages.is_empty() {
        let names: Vec<&str> = summary.degraded_stages.iter().map(StageKind::as_str).collect();
        output.push_str(&format!("\n\u{26A0} Degraded stages: {}\n", names.join(", ")));
    }

    output.push_str(&format!(
        "\nRun {} via {} in {}ms\n",
        analysis.metadata.run_id, analysis.metadata.provider, analysis.metadata.duration_ms
    ));
    output
}

fn format_stage(result: &StageResult) -> String {
    let title = match result.stage {
        StageKind::Error => "Error Analysis",
        StageKind::Code => "Code Analysis",
        StageKind::RootCause => "Root Cause",
        StageKind::Solution => "Solution",
    };
    let mut output = format!("{} [{}ms]\n", title, result.latency_ms);

    let Some(payload) = &result.payload else {
        match &result.error {
            Some(error) => output.push_str(&format!("\u{2514}\u{2500} Failed: {}\n", error)),
            None => output.push_str("\u{2514}\u{2500} Failed\n"),
        }
        return output;
    };

    let mut lines: Vec<String> = Vec::new();
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
                lines.push(format!("Affected: {}", f.affected_components.join(", ")));
            }
        }
        StagePayload::Code(f) => {
            lines.push(format!("Language: {}", f.language));
            for bug in &f.potential_bugs {
                match bug.line {
                    Some(line) => lines.push(format!("Bug (line {}): {}", line, bug.description)),
                    None => lines.push(format!("Bug: {}", bug.description)),
                }
            }
            for issue in &f.quality_issues {
                lines.push(format!("Quality: {}", issue));
            }
            for concern in &f.security_concerns {
                lines.push(format!("Security: {}", concern.description));
            }
            lines.push(format!("Quality score: {}/10 ({})", f.quality.score, f.quality.summary));
            if let Some(summary) = &f.summary {
                lines.push(format!("Summary: {}", summary));
            }
        }
        StagePayload::RootCause(f) => {
            lines.push(format!("Cause: {}", f.cause));
            if let Some(confidence) = f.confidence {
                lines.push(format!("Confidence: {:.0}%", confidence * 100.0));
            }
            if !f.causal_chain.is_empty() {
                lines.push(format!("Chain: {}", f.causal_chain.join(" -> ")));
            }
        }
        StagePayload::Solution(f) => {
            lines.push(format!("Fix: {}", f.summary));
            for (i, step) in f.fix_steps.iter().enumerate() {
                lines.push(format!("Step {}: {}", i + 1, step));
            }
            for tip in &f.prevention_tips {
                lines.push(format!("Prevention: {}", tip));
            }
        }
    }

    for (i, line) in lines.iter().enumerate() {
        let connector = if i + 1 == lines.len() {
            "\u{2514}"
        } else {
            "\u{251C}"
        };
        output.push_str(&format!("{}\u{2500} {}\n", connector, line));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        AnalysisSummary, ErrorHints, ErrorFindings, RunMetadata, RunStatus,
    };
    use crate::llm::{ProviderError, TextResult, TransportKind};
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    fn create_test_analysis() -> CombinedAnalysis {
        let reply = TextResult::new("{}", TransportKind::InProcess, Duration::from_millis(40));
        let error = StageResult::succeeded(
            StageKind::Error,
            &reply,
            StagePayload::Error(ErrorFindings {
                category: Some("arithmetic".to_string()),
                severity: Some("high".to_string()),
                cause: "Division by zero in report totals".to_string(),
                confidence: Some(0.9),
                affected_components: vec!["reports.py".to_string()],
                common_triggers: Vec::new(),
                rule_hints: ErrorHints::default(),
            }),
        );
        let code = StageResult::failed(
            StageKind::Code,
            ProviderError::Timeout { timeout_ms: 60_000 },
            Duration::from_secs(60),
        );
        let stages = vec![error, code];
        let summary = AnalysisSummary::build(&stages, &[]);

        CombinedAnalysis {
            status: RunStatus::from_results(&stages),
            stages,
            similar_bugs: Vec::new(),
            summary,
            metadata: RunMetadata {
                run_id: Uuid::new_v4(),
                started_at: Utc::now(),
                duration_ms: 1234,
                stages_run: vec![StageKind::Error, StageKind::Code],
                provider: "openai".to_string(),
            },
        }
    }

    #[test]
    fn test_json_format() {
        let analysis = create_test_analysis();
        let output = OutputFormatter::new(OutputFormat::Json)
            .format_analysis(&analysis)
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["status"], "partial");
        assert_eq!(parsed["stages"][0]["stage"], "error");
    }

    #[test]
    fn test_yaml_format() {
        let analysis = create_test_analysis();
        let output = OutputFormatter::new(OutputFormat::Yaml)
            .format_analysis(&analysis)
            .unwrap();
        assert!(output.contains("status: partial"));
        let _parsed: serde_yaml::Value = serde_yaml::from_str(&output).unwrap();
    }

    #[test]
    fn test_human_format() {
        let analysis = create_test_analysis();
        let output = OutputFormatter::new(OutputFormat::Human)
            .format_analysis(&analysis)
            .unwrap();

        assert!(output.contains("Bug Analysis (partial)"));
        assert!(output.contains("Cause: Division by zero in report totals"));
        assert!(output.contains("Code Analysis"));
        assert!(output.contains("Failed: provider error"));
        assert!(output.contains("1234ms"));
    }

    #[test]
    fn test_config_formats_mask_key() {
        let config = DebuglensConfig {
            api_key: Some("sk-abcdefghijklmnop".to_string()),
            ..Default::default()
        }
        .masked();

        for format in [OutputFormat::Json, OutputFormat::Yaml, OutputFormat::Human] {
            let output = OutputFormatter::new(format).format_config(&config).unwrap();
            assert!(!output.contains("abcdefghijkl"));
            assert!(output.contains("sk-a...mnop"));
        }
    }
}
