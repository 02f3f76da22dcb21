//! Stage prompt templates
//!
//! Templates use `{name}` placeholders. They are plain configuration: the
//! built-in set can be replaced wholesale or per stage from the `[prompts]`
//! table of the config file.

use serde::{Deserialize, Serialize};

/// System and user template for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTemplate {
    pub system: String,
    pub user: String,
}

/// Rendered prompt pair
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

impl StageTemplate {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    pub fn render(&self, vars: &[(&str, &str)]) -> RenderedPrompt {
        RenderedPrompt {
            system: render_template(&self.system, vars),
            user: render_template(&self.user, vars),
        }
    }
}

/// Substitutes `{name}` placeholders in one pass.
///
/// Substituted values are never re-scanned, so braces inside user code stay
/// untouched. Unknown placeholders are kept verbatim.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_placeholder(&after[..close]) => {
                let name = &after[..close];
                match vars.iter().find(|(key, _)| *key == name) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_placeholder(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Templates for all four stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub error: StageTemplate,
    pub code: StageTemplate,
    pub root_cause: StageTemplate,
    pub solution: StageTemplate,
}

const ANALYST_SYSTEM: &str = "You are a senior software engineer who diagnoses bugs. \
Answer with a single JSON object and nothing else.";

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            error: StageTemplate::new(
                ANALYST_SYSTEM,
                r#"Analyze the following error message.

Error message:
{error_message}

Pattern-based pre-analysis: {rule_hints}

Earlier turns of this conversation:
{history}

Respond with JSON using exactly these keys:
{
  "category": "syntax | runtime | logic | resource | configuration | dependency | other",
  "severity": "critical | high | medium | low",
  "cause": "one or two sentences on what directly triggered the error",
  "confidence": 0.0,
  "affected_components": ["component names"],
  "common_triggers": ["typical situations that produce this error"]
}"#,
            ),
            code: StageTemplate::new(
                ANALYST_SYSTEM,
                r#"Review the following {language} code for bugs, security weaknesses and quality problems.

Code:
{code_snippet}

Problem description (may be empty): {problem_description}

Earlier turns of this conversation:
{history}

Respond with JSON using exactly these keys:
{
  "language": "{language}",
  "potential_bugs": [{"description": "what is wrong", "line": 0, "severity": "high | medium | low"}],
  "quality_issues": ["maintainability or style problems"],
  "security_concerns": [{"description": "weakness", "severity": "high | medium | low", "mitigation": "how to fix it"}],
  "complexity_score": 5,
  "structure_quality": "good | fair | poor",
  "naming_consistent": true,
  "indentation_consistent": true,
  "comment_quality": "good | fair | poor",
  "summary": "one paragraph overall assessment"
}
complexity_score runs from 1 (trivial) to 10 (very complex)."#,
            ),
            root_cause: StageTemplate::new(
                ANALYST_SYSTEM,
                r#"Determine the root cause of the problem using all available evidence.

Problem description:
{problem_description}

Error analysis:
{error_context}

Code analysis:
{code_context}

Key log lines:
{log_lines}

Category prior from error patterns: {cause_prior}

Earlier turns of this conversation:
{history}

Respond with JSON using exactly these keys:
{
  "cause": "the underlying root cause",
  "confidence": 0.0,
  "category": "data | logic | system | code",
  "causal_chain": ["ordered steps from root cause to observed failure"],
  "explanation": "why this is the root cause",
  "evidence": ["facts from the inputs supporting this conclusion"]
}"#,
            ),
            solution: StageTemplate::new(
                ANALYST_SYSTEM,
                r#"Propose a fix for the problem below.

Root cause:
{root_cause}

Error message:
{error_message}

Code:
{code_snippet}

Earlier turns of this conversation:
{history}

Respond with JSON using exactly these keys:
{
  "summary": "short description of the fix",
  "fix_steps": ["ordered steps"],
  "code_changes": [{"original": "code before", "fixed": "code after", "explanation": "why"}],
  "prevention_tips": ["how to avoid this class of bug"],
  "alternatives": ["other viable approaches"]
}"#,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_known_placeholders() {
        let out = render_template("Hello {name}, {unknown}!", &[("name", "Ada")]);
        assert_eq!(out, "Hello Ada, {unknown}!");
    }

    #[test]
    fn test_render_keeps_json_braces() {
        let out = render_template(r#"{"cause": "{cause}"}"#, &[("cause", "x")]);
        assert_eq!(out, r#"{"cause": "x"}"#);
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let out = render_template(
            "{code} / {history}",
            &[("code", "fn f() { {history} }"), ("history", "H")],
        );
        assert_eq!(out, "fn f() { {history} } / H");
    }

    #[test]
    fn test_unclosed_brace() {
        assert_eq!(render_template("a { b", &[]), "a { b");
    }

    #[test]
    fn test_default_templates_have_history_slot() {
        let templates = PromptTemplates::default();
        for template in [
            &templates.error,
            &templates.code,
            &templates.root_cause,
            &templates.solution,
        ] {
            assert!(template.user.contains("{history}"));
        }
    }

    #[test]
    fn test_partial_override_from_toml() {
        let templates: PromptTemplates = toml::from_str(
            r#"
            [error]
            system = "custom"
            user = "E: {error_message}"
            "#,
        )
        .unwrap();
        assert_eq!(templates.error.system, "custom");
        assert_eq!(templates.code, PromptTemplates::default().code);
    }
}
