use super::{describe_dependency, or_not_provided, run_stage, StageAnalyzer, StageContext};
use crate::analysis::findings::SolutionFindings;
use crate::analysis::prompts::StageTemplate;
use crate::analysis::result::{StageKind, StagePayload, StageResult};
use crate::llm::{AskOverrides, LlmClient};
use async_trait::async_trait;
use std::sync::Arc;

const HISTORY_CHARS: usize = 2000;

/// Proposes a fix for the identified root cause
pub struct SolutionAnalyzer {
    client: Arc<LlmClient>,
    template: StageTemplate,
}

impl SolutionAnalyzer {
    pub fn new(client: Arc<LlmClient>, template: StageTemplate) -> Self {
        Self { client, template }
    }
}

#[async_trait]
impl StageAnalyzer for SolutionAnalyzer {
    fn kind(&self) -> StageKind {
        StageKind::Solution
    }

    async fn analyze(&self, context: &StageContext<'_>) -> StageResult {
        let root_cause = match context.dependency(StageKind::RootCause) {
            Some(result) if result.payload.is_some() || result.raw_text.is_some() => {
                describe_dependency(Some(result))
            }
            // Without a usable root cause, fall back to what the user reported
            _ => or_not_provided(context.request.problem_description()).to_string(),
        };

        let prompt = self.template.render(&[
            ("root_cause", root_cause.as_str()),
            ("error_message", or_not_provided(context.request.error_message())),
            ("code_snippet", or_not_provided(context.request.code_snippet())),
            (
                "problem_description",
                or_not_provided(context.request.problem_description()),
            ),
            ("history", context.history_tail(HISTORY_CHARS)),
        ]);

        run_stage(
            &self.client,
            StageKind::Solution,
            prompt,
            &AskOverrides::default(),
            |text| SolutionFindings::from_reply(text).map(StagePayload::Solution),
        )
        .await
    }
}
