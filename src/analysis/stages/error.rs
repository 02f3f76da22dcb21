use super::{run_stage, StageAnalyzer, StageContext};
use crate::analysis::findings::ErrorFindings;
use crate::analysis::heuristics::ErrorHints;
use crate::analysis::prompts::StageTemplate;
use crate::analysis::result::{StageKind, StagePayload, StageResult};
use crate::llm::{AskOverrides, LlmClient};
use async_trait::async_trait;
use std::sync::Arc;

const HISTORY_CHARS: usize = 2000;

/// Classifies the error message and explains its immediate cause
pub struct ErrorAnalyzer {
    client: Arc<LlmClient>,
    template: StageTemplate,
}

impl ErrorAnalyzer {
    pub fn new(client: Arc<LlmClient>, template: StageTemplate) -> Self {
        Self { client, template }
    }
}

#[async_trait]
impl StageAnalyzer for ErrorAnalyzer {
    fn kind(&self) -> StageKind {
        StageKind::Error
    }

    async fn analyze(&self, context: &StageContext<'_>) -> StageResult {
        let error_message = context.request.error_message().unwrap_or_default();
        let hints = ErrorHints::from_error_text(error_message);
        let rule_hints = hints.describe();

        let prompt = self.template.render(&[
            ("error_message", error_message),
            ("rule_hints", rule_hints.as_str()),
            ("history", context.history_tail(HISTORY_CHARS)),
        ]);

        run_stage(
            &self.client,
            StageKind::Error,
            prompt,
            &AskOverrides::default(),
            move |text| ErrorFindings::from_reply(text, hints).map(StagePayload::Error),
        )
        .await
    }
}
