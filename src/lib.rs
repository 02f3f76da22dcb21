//! debuglens - LLM-backed debugging assistant
//!
//! A bug report (error message, code snippet, problem description and/or
//! log excerpt) is analyzed in up to four LLM-backed stages: error analysis,
//! code analysis, root-cause analysis and solution generation. Independent
//! stages run concurrently; a stage that fails or returns an unusable reply
//! degrades the run instead of aborting it.
//!
//! # Core Concepts
//!
//! - **Providers**: OpenAI, Azure OpenAI and Anthropic adapters behind
//!   [`llm::ProviderAdapter`], each trying the native SDK before raw HTTP
//! - **Client**: [`LlmClient`] adds per-call timeouts, retries with backoff
//!   and reply normalization
//! - **Engine**: [`AnalysisEngine`] runs the stage graph and merges results
//!   into a [`CombinedAnalysis`]
//! - **Dialog**: [`DialogManager`] keeps bounded per-session history and
//!   feeds it back into follow-up runs
//!
//! # Example Usage
//!
//! ```no_run
//! use debuglens::{AnalysisEngine, AnalysisRequest, LlmClient, ProviderConfig, ProviderKind};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = LlmClient::new(ProviderConfig::new(ProviderKind::OpenAi, "sk-..."))?;
//! let engine = AnalysisEngine::new(Arc::new(client));
//!
//! let request = AnalysisRequest::builder()
//!     .error_message("ZeroDivisionError: division by zero")
//!     .code_snippet("def avg(xs): return sum(xs) / len(xs)")
//!     .build();
//!
//! let analysis = engine.run(&request, "").await?;
//! println!("{}: {:?}", analysis.status, analysis.summary.recommendation);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod dialog;
pub mod knowledge;
pub mod llm;
pub mod progress;
pub mod util;

pub use analysis::{
    AnalysisEngine, AnalysisError, AnalysisRequest, CombinedAnalysis, DeadlinePolicy,
    RunOptions, RunStatus, StageKind, StageResult, ValidationError,
};
pub use config::{ConfigError, DebuglensConfig};
pub use dialog::{DialogError, DialogManager, TurnPolicy};
pub use knowledge::{HttpKnowledgeBase, KnowledgeBase, SimilarBug};
pub use llm::{LlmClient, ProviderConfig, ProviderError, ProviderKind};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
