//! Analysis engine
//!
//! Validates the request, schedules the applicable stages wave by wave
//! (stages inside a wave run concurrently), merges their results, and
//! optionally enriches the outcome with similar bugs from the knowledge base.
//!
//! A run only returns `Err` when the request is rejected up front or the
//! deadline expires under [`DeadlinePolicy::Abandon`]. Stage failures are
//! reported through [`RunStatus`] instead.

use super::dag::StageGraph;
use super::error::AnalysisError;
use super::prompts::PromptTemplates;
use super::request::AnalysisRequest;
use super::result::{
    AnalysisSummary, CombinedAnalysis, RunMetadata, RunStatus, StageKind, StageResult,
};
use super::stages::{
    CodeAnalyzer, ErrorAnalyzer, RootCauseAnalyzer, SolutionAnalyzer, StageAnalyzer, StageContext,
};
use crate::knowledge::{composite_query, KnowledgeBase, SimilarBug, DEFAULT_TOP_K};
use crate::llm::LlmClient;
use crate::progress::{ProgressEvent, ProgressHandler};
use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_KB_TIMEOUT_SECS: u64 = 10;

/// What to do when a run's deadline expires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeadlinePolicy {
    /// Discard everything and return [`AnalysisError::DeadlineExceeded`]
    Abandon,
    /// Keep completed stages, mark the rest cancelled
    #[default]
    AcceptPartial,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub deadline: Option<Duration>,
    pub on_deadline: DeadlinePolicy,
}

impl RunOptions {
    pub fn with_deadline(deadline: Duration, policy: DeadlinePolicy) -> Self {
        Self {
            deadline: Some(deadline),
            on_deadline: policy,
        }
    }
}

/// Lifecycle of a single run
#[derive(Debug, Clone, PartialEq)]
enum RunState {
    Pending,
    Running(Vec<StageKind>),
    Merging,
    Done(RunStatus),
    Failed,
}

impl RunState {
    fn advance(&mut self, next: RunState, run_id: &Uuid) {
        debug!(run_id = %run_id, from = ?self, to = ?next, "Run state transition");
        *self = next;
    }
}

pub struct AnalysisEngine {
    analyzers: HashMap<StageKind, Arc<dyn StageAnalyzer>>,
    graph: StageGraph,
    knowledge_base: Option<Arc<dyn KnowledgeBase>>,
    kb_top_k: usize,
    kb_timeout: Duration,
    provider: String,
    progress_handler: Option<Arc<dyn ProgressHandler>>,
}

impl AnalysisEngine {
    /// Engine with the built-in prompt templates
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self::with_templates(client, PromptTemplates::default())
    }

    pub fn with_templates(client: Arc<LlmClient>, templates: PromptTemplates) -> Self {
        let provider = client.provider_name().to_string();
        let analyzers: Vec<Arc<dyn StageAnalyzer>> = vec![
            Arc::new(ErrorAnalyzer::new(client.clone(), templates.error)),
            Arc::new(CodeAnalyzer::new(client.clone(), templates.code)),
            Arc::new(RootCauseAnalyzer::new(client.clone(), templates.root_cause)),
            Arc::new(SolutionAnalyzer::new(client, templates.solution)),
        ];
        let mut engine = Self::from_analyzers(analyzers);
        engine.provider = provider;
        engine
    }

    /// Engine over explicit analyzers; later entries replace earlier ones of the same kind
    pub fn from_analyzers(analyzers: Vec<Arc<dyn StageAnalyzer>>) -> Self {
        Self {
            analyzers: analyzers.into_iter().map(|a| (a.kind(), a)).collect(),
            graph: StageGraph::standard(),
            knowledge_base: None,
            kb_top_k: DEFAULT_TOP_K,
            kb_timeout: Duration::from_secs(DEFAULT_KB_TIMEOUT_SECS),
            provider: "custom".to_string(),
            progress_handler: None,
        }
    }

    pub fn with_knowledge_base(mut self, knowledge_base: Arc<dyn KnowledgeBase>, top_k: usize) -> Self {
        self.knowledge_base = Some(knowledge_base);
        self.kb_top_k = top_k;
        self
    }

    pub fn with_knowledge_base_timeout(mut self, timeout: Duration) -> Self {
        self.kb_timeout = timeout;
        self
    }

    pub fn with_progress_handler(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress_handler = Some(handler);
        self
    }

    /// Upper bound on the similar-bug lookup after the stages finish
    pub fn knowledge_base_timeout(&self) -> Duration {
        self.kb_timeout
    }

    pub fn has_knowledge_base(&self) -> bool {
        self.knowledge_base.is_some()
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress_handler {
            handler.on_progress(&event);
        }
    }

    pub async fn run(
        &self,
        request: &AnalysisRequest,
        history: &str,
    ) -> Result<CombinedAnalysis, AnalysisError> {
        self.run_with_options(request, history, &RunOptions::default())
            .await
    }

    pub async fn run_with_options(
        &self,
        request: &AnalysisRequest,
        history: &str,
        options: &RunOptions,
    ) -> Result<CombinedAnalysis, AnalysisError> {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let mut state = RunState::Pending;

        if let Err(e) = request.validate() {
            warn!(run_id = %run_id, "Rejecting analysis request: {}", e);
            self.emit(ProgressEvent::RunFailed {
                error: e.to_string(),
            });
            return Err(e.into());
        }

        let applicable = self.graph.applicable(request);
        if let Some(missing) = applicable.iter().find(|s| !self.analyzers.contains_key(s)) {
            return Err(AnalysisError::MissingStage(*missing));
        }

        info!(
            run_id = %run_id,
            stages = ?applicable.iter().map(StageKind::as_str).collect::<Vec<_>>(),
            "Starting analysis run"
        );
        self.emit(ProgressEvent::RunStarted {
            run_id: run_id.to_string(),
            stages: applicable.clone(),
        });

        let deadline = options
            .deadline
            .map(|budget| tokio::time::Instant::now() + budget);
        let mut completed: Vec<StageResult> = Vec::with_capacity(applicable.len());
        let mut deadline_hit = false;

        'waves: for wave in self.graph.waves(&applicable) {
            state.advance(RunState::Running(wave.clone()), &run_id);

            let mut in_flight = FuturesUnordered::new();
            for stage in wave {
                let analyzer = self
                    .analyzers
                    .get(&stage)
                    .cloned()
                    .ok_or(AnalysisError::MissingStage(stage))?;
                let upstream: Vec<StageResult> = self
                    .graph
                    .dependencies(stage)
                    .into_iter()
                    .filter_map(|dep| completed.iter().find(|r| r.stage == dep).cloned())
                    .collect();
                let context = StageContext::new(request, history).with_upstream(upstream);

                self.emit(ProgressEvent::StageStarted { stage });
                in_flight.push(async move {
                    let stage_start = Instant::now();
                    let result = analyzer.analyze(&context).await;
                    (result, stage_start.elapsed())
                });
            }

            loop {
                let next = match deadline {
                    Some(at) => match tokio::time::timeout_at(at, in_flight.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            deadline_hit = true;
                            break 'waves;
                        }
                    },
                    None => in_flight.next().await,
                };

                let Some((result, elapsed)) = next else {
                    break;
                };
                self.emit(ProgressEvent::StageCompleted {
                    stage: result.stage,
                    success: result.success,
                    duration: elapsed,
                });
                completed.push(result);
            }
        }

        if deadline_hit {
            let cancelled: Vec<StageKind> = applicable
                .iter()
                .copied()
                .filter(|s| !completed.iter().any(|r| r.stage == *s))
                .collect();
            warn!(
                run_id = %run_id,
                completed = completed.len(),
                cancelled = cancelled.len(),
                "Analysis deadline reached"
            );
            self.emit(ProgressEvent::DeadlineReached {
                cancelled: cancelled.clone(),
            });

            match options.on_deadline {
                DeadlinePolicy::Abandon => {
                    state.advance(RunState::Failed, &run_id);
                    let error = AnalysisError::DeadlineExceeded {
                        deadline_ms: options
                            .deadline
                            .map(|d| d.as_millis() as u64)
                            .unwrap_or_default(),
                        completed: completed.len(),
                    };
                    self.emit(ProgressEvent::RunFailed {
                        error: error.to_string(),
                    });
                    return Err(error);
                }
                DeadlinePolicy::AcceptPartial => {
                    completed.extend(cancelled.into_iter().map(StageResult::cancelled));
                }
            }
        }

        state.advance(RunState::Merging, &run_id);
        let status = RunStatus::from_results(&completed);

        let similar_bugs = if status == RunStatus::Failed || deadline_hit {
            Vec::new()
        } else {
            self.query_knowledge_base(request, &completed).await
        };

        let summary = AnalysisSummary::build(&completed, &similar_bugs);
        let metadata = RunMetadata {
            run_id,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            stages_run: completed.iter().map(|r| r.stage).collect(),
            provider: self.provider.clone(),
        };

        state.advance(RunState::Done(status), &run_id);
        info!(
            run_id = %run_id,
            status = %status,
            duration_ms = metadata.duration_ms,
            "Analysis run finished"
        );
        self.emit(ProgressEvent::RunCompleted {
            status,
            total_time: start.elapsed(),
        });

        Ok(CombinedAnalysis {
            stages: completed,
            similar_bugs,
            status,
            summary,
            metadata,
        })
    }

    async fn query_knowledge_base(
        &self,
        request: &AnalysisRequest,
        results: &[StageResult],
    ) -> Vec<SimilarBug> {
        let Some(knowledge_base) = &self.knowledge_base else {
            return Vec::new();
        };

        let find = |kind: StageKind| results.iter().find(|r| r.stage == kind);
        let Some(query) = composite_query(
            request,
            find(StageKind::Error),
            find(StageKind::RootCause),
        ) else {
            return Vec::new();
        };

        match tokio::time::timeout(
            self.kb_timeout,
            knowledge_base.find_similar(&query, self.kb_top_k),
        )
        .await
        {
            Ok(Ok(bugs)) => {
                self.emit(ProgressEvent::KnowledgeBaseQueried {
                    results: bugs.len(),
                });
                bugs
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Knowledge base query failed, continuing without similar bugs");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.kb_timeout.as_secs(),
                    "Knowledge base query timed out, continuing without similar bugs"
                );
                Vec::new()
            }
        }
    }
}

impl fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stages: Vec<&StageKind> = self.analyzers.keys().collect();
        stages.sort();
        f.debug_struct("AnalysisEngine")
            .field("provider", &self.provider)
            .field("stages", &stages)
            .field("knowledge_base", &self.knowledge_base.is_some())
            .field("kb_top_k", &self.kb_top_k)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockProvider, MockResponse, ProviderConfig, ProviderKind};

    fn engine_with(mock: Arc<MockProvider>) -> AnalysisEngine {
        let client = LlmClient::with_adapter(ProviderConfig::new(ProviderKind::OpenAi, "sk"), mock);
        AnalysisEngine::new(Arc::new(client))
    }

    #[tokio::test]
    async fn test_missing_analyzer_is_reported() {
        let mock = Arc::new(MockProvider::new());
        let client = Arc::new(LlmClient::with_adapter(
            ProviderConfig::new(ProviderKind::OpenAi, "sk"),
            mock,
        ));
        let engine = AnalysisEngine::from_analyzers(vec![Arc::new(ErrorAnalyzer::new(
            client,
            PromptTemplates::default().error,
        ))]);

        let request = AnalysisRequest::builder().error_message("boom").build();
        let err = engine.run(&request, "").await.unwrap_err();
        assert!(matches!(err, AnalysisError::MissingStage(StageKind::RootCause)));
    }

    #[tokio::test]
    async fn test_description_only_runs_two_stages() {
        let mock = Arc::new(MockProvider::new());
        mock.respond_to(
            "root_cause",
            MockResponse::text(r#"{"cause": "session cache never invalidated"}"#),
        );
        mock.respond_to(
            "solution",
            MockResponse::text(r#"{"summary": "Invalidate on logout"}"#),
        );

        let engine = engine_with(mock.clone());
        let request = AnalysisRequest::builder()
            .problem_description("users see stale data after logout")
            .build();
        let analysis = engine.run(&request, "").await.unwrap();

        assert_eq!(analysis.status, RunStatus::Complete);
        assert_eq!(analysis.stage_names(), vec!["root_cause", "solution"]);
        assert_eq!(mock.call_count(), 2);
        assert_eq!(analysis.metadata.provider, "mock");
    }

    #[test]
    fn test_run_state_advance() {
        let run_id = Uuid::new_v4();
        let mut state = RunState::Pending;
        state.advance(RunState::Running(vec![StageKind::Error]), &run_id);
        state.advance(RunState::Merging, &run_id);
        state.advance(RunState::Done(RunStatus::Complete), &run_id);
        assert_eq!(state, RunState::Done(RunStatus::Complete));
    }
}
