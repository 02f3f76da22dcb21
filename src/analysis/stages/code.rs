use super::{or_not_provided, run_stage, StageAnalyzer, StageContext};
use crate::analysis::findings::CodeFindings;
use crate::analysis::heuristics::detect_language;
use crate::analysis::prompts::StageTemplate;
use crate::analysis::result::{StageKind, StagePayload, StageResult};
use crate::llm::{AskOverrides, LlmClient};
use async_trait::async_trait;
use std::sync::Arc;

const HISTORY_CHARS: usize = 1000;

/// Reviews the code snippet for bugs and quality issues
pub struct CodeAnalyzer {
    client: Arc<LlmClient>,
    template: StageTemplate,
}

impl CodeAnalyzer {
    pub fn new(client: Arc<LlmClient>, template: StageTemplate) -> Self {
        Self { client, template }
    }
}

#[async_trait]
impl StageAnalyzer for CodeAnalyzer {
    fn kind(&self) -> StageKind {
        StageKind::Code
    }

    async fn analyze(&self, context: &StageContext<'_>) -> StageResult {
        let code = context.request.code_snippet().unwrap_or_default();
        let language = detect_language(code);

        let prompt = self.template.render(&[
            ("code_snippet", code),
            ("language", language),
            (
                "problem_description",
                or_not_provided(context.request.problem_description()),
            ),
            ("history", context.history_tail(HISTORY_CHARS)),
        ]);

        run_stage(
            &self.client,
            StageKind::Code,
            prompt,
            &AskOverrides::default(),
            move |text| CodeFindings::from_reply(text, language).map(StagePayload::Code),
        )
        .await
    }
}
