//! Progress handler trait and events

use crate::analysis::{RunStatus, StageKind};
use std::time::Duration;

/// Events emitted while an analysis run progresses
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Run accepted; `stages` are the applicable stages
    RunStarted {
        run_id: String,
        stages: Vec<StageKind>,
    },

    /// A stage was dispatched
    StageStarted { stage: StageKind },

    /// A stage finished (successfully or not)
    StageCompleted {
        stage: StageKind,
        success: bool,
        duration: Duration,
    },

    /// The run's deadline expired with stages still in flight
    DeadlineReached { cancelled: Vec<StageKind> },

    /// Knowledge base returned similar bugs
    KnowledgeBaseQueried { results: usize },

    /// Run finished and produced a combined analysis
    RunCompleted {
        status: RunStatus,
        total_time: Duration,
    },

    /// Run was rejected or abandoned without a combined analysis
    RunFailed { error: String },
}

/// Trait for handling progress events during analysis
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_handler() {
        let handler = NoOpHandler;
        handler.on_progress(&ProgressEvent::StageStarted {
            stage: StageKind::Error,
        });
    }

    #[test]
    fn test_progress_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ProgressEvent::RunStarted {
            run_id: "r1".to_string(),
            stages: vec![StageKind::Error, StageKind::RootCause],
        });
        handler.on_progress(&ProgressEvent::StageCompleted {
            stage: StageKind::Error,
            success: true,
            duration: Duration::from_millis(50),
        });
        handler.on_progress(&ProgressEvent::RunCompleted {
            status: RunStatus::Complete,
            total_time: Duration::from_secs(2),
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_event_debug() {
        let event = ProgressEvent::StageStarted {
            stage: StageKind::RootCause,
        };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("StageStarted"));
        assert!(debug_str.contains("RootCause"));
    }
}
