//! A single conversation: a bounded FIFO of past turns

use crate::analysis::{AnalysisRequest, CombinedAnalysis, StageKind, StageResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_TURNS: usize = 5;
const HISTORY_FIELD_CHARS: usize = 500;

/// One recorded request/result pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub request: AnalysisRequest,
    pub result: CombinedAnalysis,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ConversationSession {
    id: String,
    turns: VecDeque<Turn>,
    max_turns: usize,
    created_at: DateTime<Utc>,
    last_touched: Instant,
}

impl ConversationSession {
    pub fn new(id: impl Into<String>, max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            id: id.into(),
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
            created_at: Utc::now(),
            last_touched: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Turns, oldest first
    pub fn turns(&self) -> &VecDeque<Turn> {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Appends a turn, dropping the oldest ones beyond `max_turns`
    pub fn record(&mut self, request: AnalysisRequest, result: CombinedAnalysis) {
        self.turns.push_back(Turn {
            request,
            result,
            recorded_at: Utc::now(),
        });
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_touched = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_touched.elapsed()
    }

    /// Renders the turns as prompt context. Empty when there are no turns.
    pub fn format_history(&self) -> String {
        let mut out = String::new();
        for (i, turn) in self.turns.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("Turn {}:\n", i + 1));

            let request = &turn.request;
            let fields = [
                ("Error message", request.error_message()),
                ("Code snippet", request.code_snippet()),
                ("Problem description", request.problem_description()),
                ("Log info", request.log_info()),
            ];
            for (label, value) in fields {
                if let Some(value) = value {
                    out.push_str(&format!("  {}: {}\n", label, truncate(value)));
                }
            }

            let result = &turn.result;
            out.push_str(&format!("  Outcome: {}\n", result.status));
            if let Some(root) = result
                .stage(StageKind::RootCause)
                .and_then(StageResult::root_cause_findings)
            {
                out.push_str(&format!("  Root cause: {}\n", truncate(&root.cause)));
            }
            if let Some(solution) = result
                .stage(StageKind::Solution)
                .and_then(StageResult::solution_findings)
            {
                out.push_str(&format!("  Solution: {}\n", truncate(&solution.summary)));
            }
        }
        out
    }
}

fn truncate(value: &str) -> String {
    let value = value.trim();
    if value.chars().count() <= HISTORY_FIELD_CHARS {
        return value.to_string();
    }
    let mut cut: String = value.chars().take(HISTORY_FIELD_CHARS).collect();
    cut.push_str("...");
    cut
}
