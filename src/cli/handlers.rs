//! Command handlers
//!
//! Each handler returns the process exit code: 0 for a complete or partial
//! analysis, 2 when every stage failed, 1 for configuration and input errors.

use super::commands::{AnalyzeArgs, ConfigArgs};
use super::output::OutputFormatter;
use crate::analysis::{
    AnalysisEngine, AnalysisRequest, DeadlinePolicy, RunOptions, RunStatus,
};
use crate::config::DebuglensConfig;
use crate::llm::{LlmClient, TransportPreference};
use crate::progress::LoggingHandler;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub const EXIT_OK: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_ANALYSIS_FAILED: i32 = 2;

pub async fn handle_analyze(args: &AnalyzeArgs, quiet: bool) -> i32 {
    match run_analyze(args, quiet).await {
        Ok(code) => code,
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    }
}

pub fn handle_config(args: &ConfigArgs) -> i32 {
    let result = DebuglensConfig::load(args.config.as_deref())
        .context("Failed to load configuration")
        .and_then(|config| OutputFormatter::new(args.format.into()).format_config(&config.masked()));

    match result {
        Ok(output) => {
            println!("{}", output);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    }
}

async fn run_analyze(args: &AnalyzeArgs, quiet: bool) -> Result<i32> {
    let config = resolve_config(args)?;
    debug!(config = ?config, "Resolved configuration");

    let request = build_request(args)?;
    request.validate()?;

    let provider_config = config.provider_config()?;
    let client = LlmClient::new(provider_config)
        .context("Failed to create LLM client")?
        .with_retry_policy(config.retry_policy());

    let engine = build_engine(&config, Arc::new(client), quiet)?;

    let options = args
        .deadline
        .map(|secs| RunOptions::with_deadline(Duration::from_secs(secs), DeadlinePolicy::AcceptPartial))
        .unwrap_or_default();

    info!(provider = %config.provider, model = config.model_name(), "Analyzing");
    let analysis = engine.run_with_options(&request, "", &options).await?;

    let output = OutputFormatter::new(args.format.into()).format_analysis(&analysis)?;
    println!("{}", output);

    Ok(match analysis.status {
        RunStatus::Failed => EXIT_ANALYSIS_FAILED,
        RunStatus::Complete | RunStatus::Partial => EXIT_OK,
    })
}

/// Wires the configured templates, knowledge base and timeouts into an engine
fn build_engine(
    config: &DebuglensConfig,
    client: Arc<LlmClient>,
    quiet: bool,
) -> Result<AnalysisEngine> {
    let mut engine = AnalysisEngine::with_templates(client, config.prompts.clone());
    if let Some(knowledge_base) = config.knowledge_base()? {
        engine = engine
            .with_knowledge_base(Arc::new(knowledge_base), config.knowledge_base_top_k)
            .with_knowledge_base_timeout(config.knowledge_base_timeout());
    }
    if !quiet {
        engine = engine.with_progress_handler(Arc::new(LoggingHandler));
    }
    Ok(engine)
}

/// File, then environment, then flags
fn resolve_config(args: &AnalyzeArgs) -> Result<DebuglensConfig> {
    let mut config =
        DebuglensConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(provider) = args.provider {
        if provider != config.provider {
            config.provider = provider;
            if env::var("DEBUGLENS_API_KEY").is_err() {
                config.api_key = env::var(provider.api_key_env_var()).ok();
            }
        }
    }
    if let Some(model) = &args.model {
        config.model = Some(model.clone());
    }
    if args.http_only {
        config.transport = TransportPreference::HttpOnly;
    }
    if args.no_kb {
        config.knowledge_base_url = None;
    }

    config.validate()?;
    Ok(config)
}

fn build_request(args: &AnalyzeArgs) -> Result<AnalysisRequest> {
    let mut builder = AnalysisRequest::builder();
    if let Some(path) = &args.error_file {
        builder = builder.error_message(read_input(path)?);
    }
    if let Some(path) = &args.code_file {
        builder = builder.code_snippet(read_input(path)?);
    }
    if let Some(path) = &args.description_file {
        builder = builder.problem_description(read_input(path)?);
    }
    if let Some(path) = &args.log_file {
        builder = builder.log_info(read_input(path)?);
    }
    Ok(builder.build())
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
