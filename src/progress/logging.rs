//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { run_id, stages } => {
                let names: Vec<&str> = stages.iter().map(|s| s.as_str()).collect();
                info!(run_id = %run_id, stages = ?names, "Starting analysis");
            }
            ProgressEvent::StageStarted { stage } => {
                debug!(stage = %stage, "Stage started");
            }
            ProgressEvent::StageCompleted {
                stage,
                success,
                duration,
            } => {
                if *success {
                    info!(
                        stage = %stage,
                        duration_ms = duration.as_millis() as u64,
                        "Stage complete"
                    );
                } else {
                    warn!(
                        stage = %stage,
                        duration_ms = duration.as_millis() as u64,
                        "Stage did not produce structured findings"
                    );
                }
            }
            ProgressEvent::DeadlineReached { cancelled } => {
                let names: Vec<&str> = cancelled.iter().map(|s| s.as_str()).collect();
                warn!(cancelled = ?names, "Analysis deadline reached");
            }
            ProgressEvent::KnowledgeBaseQueried { results } => {
                debug!(results, "Knowledge base queried");
            }
            ProgressEvent::RunCompleted { status, total_time } => {
                info!(
                    status = %status,
                    total_time_ms = total_time.as_millis() as u64,
                    "Analysis complete"
                );
            }
            ProgressEvent::RunFailed { error } => {
                warn!(error = %error, "Analysis failed");
            }
        }
    }
}
