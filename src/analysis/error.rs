use super::result::StageKind;
use thiserror::Error;

/// A request that must not reach the provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(
        "analysis request is empty: provide at least one of error_message, code_snippet, \
         problem_description or log_info"
    )]
    EmptyRequest,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("analysis deadline of {deadline_ms}ms exceeded after {completed} stage(s) completed")]
    DeadlineExceeded { deadline_ms: u64, completed: usize },

    #[error("no analyzer registered for stage '{0}'")]
    MissingStage(StageKind),
}
