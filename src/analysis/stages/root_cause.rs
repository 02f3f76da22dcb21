use super::{describe_dependency, or_not_provided, run_stage, StageAnalyzer, StageContext};
use crate::analysis::findings::RootCauseFindings;
use crate::analysis::heuristics::{extract_key_log_lines, CauseScores};
use crate::analysis::prompts::StageTemplate;
use crate::analysis::result::{StageKind, StagePayload, StageResult};
use crate::llm::{AskOverrides, LlmClient};
use async_trait::async_trait;
use std::sync::Arc;

const HISTORY_CHARS: usize = 4000;
const MAX_LOG_LINES: usize = 10;

/// Combines error, code and log evidence into a single root cause
pub struct RootCauseAnalyzer {
    client: Arc<LlmClient>,
    template: StageTemplate,
}

impl RootCauseAnalyzer {
    pub fn new(client: Arc<LlmClient>, template: StageTemplate) -> Self {
        Self { client, template }
    }
}

fn format_scores(scores: &CauseScores) -> String {
    format!(
        "data {:.2}, logic {:.2}, system {:.2}, code {:.2}",
        scores.data, scores.logic, scores.system, scores.code
    )
}

#[async_trait]
impl StageAnalyzer for RootCauseAnalyzer {
    fn kind(&self) -> StageKind {
        StageKind::RootCause
    }

    async fn analyze(&self, context: &StageContext<'_>) -> StageResult {
        let error = context.dependency(StageKind::Error);
        let code = context.dependency(StageKind::Code);

        let affected = error
            .and_then(StageResult::error_findings)
            .map(|f| f.affected_components.clone())
            .unwrap_or_default();
        let scores = CauseScores::score(
            context.request.error_message().unwrap_or_default(),
            &affected,
        );

        let log_lines = context
            .request
            .log_info()
            .map(|log| extract_key_log_lines(log, MAX_LOG_LINES))
            .filter(|lines| !lines.is_empty())
            .map(|lines| lines.join("\n"))
            .unwrap_or_else(|| "None.".to_string());

        let error_context = describe_dependency(error);
        let code_context = describe_dependency(code);
        let cause_prior = format_scores(&scores);

        let prompt = self.template.render(&[
            (
                "problem_description",
                or_not_provided(context.request.problem_description()),
            ),
            ("error_message", or_not_provided(context.request.error_message())),
            ("error_context", error_context.as_str()),
            ("code_context", code_context.as_str()),
            ("log_lines", log_lines.as_str()),
            ("cause_prior", cause_prior.as_str()),
            ("history", context.history_tail(HISTORY_CHARS)),
        ]);

        run_stage(
            &self.client,
            StageKind::RootCause,
            prompt,
            &AskOverrides::default(),
            move |text| RootCauseFindings::from_reply(text, scores).map(StagePayload::RootCause),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_scores() {
        assert_eq!(
            format_scores(&CauseScores::default()),
            "data 0.25, logic 0.25, system 0.25, code 0.25"
        );
    }
}
