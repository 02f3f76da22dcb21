//! Staged bug analysis
//!
//! A request flows through up to four stages (error, code, root cause,
//! solution) arranged in a [`StageGraph`]. The [`AnalysisEngine`] runs
//! independent stages concurrently and merges their results into a
//! [`CombinedAnalysis`].

pub mod dag;
pub mod engine;
pub mod error;
pub mod findings;
pub mod heuristics;
pub mod prompts;
pub mod quality;
pub mod request;
pub mod response;
pub mod result;
pub mod stages;

pub use dag::StageGraph;
pub use engine::{AnalysisEngine, DeadlinePolicy, RunOptions};
pub use error::{AnalysisError, ValidationError};
pub use findings::{
    CodeChange, CodeFindings, CodeIssue, ErrorFindings, RootCauseFindings, SecurityConcern,
    SolutionFindings,
};
pub use heuristics::{CauseScores, ErrorHints, StackFrame};
pub use prompts::{PromptTemplates, RenderedPrompt, StageTemplate};
pub use quality::{CodeQuality, CodeSignals, Rating, Suggestion};
pub use request::{AnalysisRequest, AnalysisRequestBuilder};
pub use response::ReplyError;
pub use result::{
    AnalysisSummary, CombinedAnalysis, RunMetadata, RunStatus, StageError, StageKind,
    StagePayload, StageResult,
};
pub use stages::{
    CodeAnalyzer, ErrorAnalyzer, RootCauseAnalyzer, SolutionAnalyzer, StageAnalyzer, StageContext,
};
