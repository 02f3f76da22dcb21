use super::session::Turn;
use super::store::{SessionStore, SessionStoreConfig};
use crate::analysis::{AnalysisEngine, AnalysisError, AnalysisRequest, CombinedAnalysis, RunOptions};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// What happens when a run arrives for a session that is already running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnPolicy {
    /// Wait for the in-flight run to finish
    #[default]
    Queue,
    /// Fail fast with [`DialogError::SessionBusy`]
    Reject,
}

#[derive(Debug, Error)]
pub enum DialogError {
    #[error("analysis failed in session {session_id}: {source}")]
    Analysis {
        session_id: String,
        #[source]
        source: AnalysisError,
    },

    #[error("session {0} already has a run in progress")]
    SessionBusy(String),
}

impl DialogError {
    pub fn session_id(&self) -> &str {
        match self {
            DialogError::Analysis { session_id, .. } => session_id,
            DialogError::SessionBusy(id) => id,
        }
    }
}

/// Runs analyses inside conversations, feeding each session's history back
/// into the next run.
pub struct DialogManager {
    engine: Arc<AnalysisEngine>,
    store: SessionStore,
    policy: TurnPolicy,
    run_options: RunOptions,
}

impl DialogManager {
    pub fn new(engine: Arc<AnalysisEngine>) -> Self {
        Self::with_store_config(engine, SessionStoreConfig::default())
    }

    pub fn with_store_config(engine: Arc<AnalysisEngine>, config: SessionStoreConfig) -> Self {
        Self {
            engine,
            store: SessionStore::new(config),
            policy: TurnPolicy::default(),
            run_options: RunOptions::default(),
        }
    }

    pub fn with_turn_policy(mut self, policy: TurnPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_run_options(mut self, options: RunOptions) -> Self {
        self.run_options = options;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Runs `request` in the given session (or a new one) and records the
    /// outcome. Returns the session id alongside the analysis.
    ///
    /// Runs that produce an analysis are recorded even when every stage
    /// failed. Requests rejected before analysis are not recorded.
    pub async fn run(
        &self,
        session_id: Option<&str>,
        request: AnalysisRequest,
    ) -> Result<(String, CombinedAnalysis), DialogError> {
        let evicted = self.store.evict_idle();
        if evicted > 0 {
            debug!(evicted, "Dropped idle sessions");
        }

        let (id, handle) = self.store.resolve(session_id);
        let mut session = match self.policy {
            TurnPolicy::Queue => handle.lock().await,
            TurnPolicy::Reject => handle
                .try_lock()
                .map_err(|_| DialogError::SessionBusy(id.clone()))?,
        };
        session.touch();

        let history = session.format_history();
        debug!(
            session_id = %id,
            turns = session.len(),
            history_chars = history.len(),
            "Running analysis turn"
        );

        let result = self
            .engine
            .run_with_options(&request, &history, &self.run_options)
            .await
            .map_err(|source| DialogError::Analysis {
                session_id: id.clone(),
                source,
            })?;

        session.record(request, result.clone());
        info!(
            session_id = %id,
            status = %result.status,
            turns = session.len(),
            "Recorded analysis turn"
        );

        Ok((id, result))
    }

    /// Recorded turns of a session, oldest first
    pub async fn history(&self, session_id: &str) -> Option<Vec<Turn>> {
        let handle = self.store.get(session_id)?;
        let session = handle.lock().await;
        Some(session.turns().iter().cloned().collect())
    }

    pub fn end_session(&self, session_id: &str) -> bool {
        self.store.remove(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmClient, MockProvider, MockResponse, ProviderConfig, ProviderKind};

    fn manager(mock: Arc<MockProvider>) -> DialogManager {
        let client = LlmClient::with_adapter(ProviderConfig::new(ProviderKind::OpenAi, "sk"), mock);
        DialogManager::new(Arc::new(AnalysisEngine::new(Arc::new(client))))
    }

    fn scripted() -> Arc<MockProvider> {
        let mock = Arc::new(MockProvider::new());
        mock.respond_to("root_cause", MockResponse::text(r#"{"cause": "stale cache"}"#));
        mock.respond_to("solution", MockResponse::text(r#"{"summary": "Clear it"}"#));
        mock
    }

    #[tokio::test]
    async fn test_new_session_is_created() {
        let manager = manager(scripted());
        let request = AnalysisRequest::builder()
            .problem_description("page shows old data")
            .build();

        let (id, result) = manager.run(None, request).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(result.stage_names(), vec!["root_cause", "solution"]);
        assert_eq!(manager.history(&id).await.map(|h| h.len()), Some(1));
    }

    #[tokio::test]
    async fn test_rejected_request_is_not_recorded() {
        let manager = manager(scripted());
        let err = manager
            .run(Some("s1"), AnalysisRequest::default())
            .await
            .unwrap_err();

        assert_eq!(err.session_id(), "s1");
        assert!(matches!(
            err,
            DialogError::Analysis {
                source: AnalysisError::Validation(_),
                ..
            }
        ));
        assert_eq!(manager.history("s1").await.map(|h| h.len()), Some(0));
    }

    #[tokio::test]
    async fn test_end_session() {
        let manager = manager(scripted());
        let request = AnalysisRequest::builder().problem_description("x").build();
        let (id, _) = manager.run(Some("s2"), request).await.unwrap();
        assert!(manager.end_session(&id));
        assert!(manager.history(&id).await.is_none());
    }
}
