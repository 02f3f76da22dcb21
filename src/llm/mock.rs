//! Scriptable in-process provider
//!
//! Responses can be queued globally (served in FIFO order) or routed by the
//! request's `purpose` label. Routing by purpose keeps tests deterministic when
//! several analysis stages call the provider concurrently.

use super::error::ProviderError;
use super::provider::ProviderAdapter;
use super::types::{CompletionOptions, LlmRequest, TextResult, TransportKind};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub content: String,
    pub error: Option<ProviderError>,
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            error: None,
            delay: None,
        }
    }

    pub fn error(error: ProviderError) -> Self {
        Self {
            content: String::new(),
            error: Some(error),
            delay: None,
        }
    }

    /// Sleeps before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Default)]
struct PurposeRoute {
    queued: VecDeque<MockResponse>,
    fallback: Option<MockResponse>,
}

#[derive(Default)]
struct MockState {
    queue: VecDeque<MockResponse>,
    routes: HashMap<String, PurposeRoute>,
    requests: Vec<LlmRequest>,
    options: Vec<CompletionOptions>,
}

pub struct MockProvider {
    name: String,
    state: Mutex<MockState>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_name("mock")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MockState::default()),
            calls: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a response for any request without a matching route
    pub fn add_response(&self, response: MockResponse) {
        self.lock().queue.push_back(response);
    }

    pub fn add_responses(&self, responses: impl IntoIterator<Item = MockResponse>) {
        let mut state = self.lock();
        state.queue.extend(responses);
    }

    /// Queues a one-shot response for requests labelled `purpose`
    pub fn queue_for(&self, purpose: impl Into<String>, response: MockResponse) {
        self.lock()
            .routes
            .entry(purpose.into())
            .or_default()
            .queued
            .push_back(response);
    }

    /// Answers every request labelled `purpose` once its queue is drained
    pub fn respond_to(&self, purpose: impl Into<String>, response: MockResponse) {
        self.lock().routes.entry(purpose.into()).or_default().fallback = Some(response);
    }

    pub fn remaining_responses(&self) -> usize {
        let state = self.lock();
        state.queue.len() + state.routes.values().map(|r| r.queued.len()).sum::<usize>()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of requests seen with the given purpose label
    pub fn calls_for(&self, purpose: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.purpose.as_deref() == Some(purpose))
            .count()
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.lock().requests.clone()
    }

    pub fn recorded_options(&self) -> Vec<CompletionOptions> {
        self.lock().options.clone()
    }

    fn next_response(&self, request: &LlmRequest) -> Option<MockResponse> {
        let mut state = self.lock();
        if let Some(purpose) = &request.purpose {
            if let Some(route) = state.routes.get_mut(purpose) {
                if let Some(response) = route.queued.pop_front() {
                    return Some(response);
                }
                if let Some(response) = &route.fallback {
                    return Some(response.clone());
                }
            }
        }
        state.queue.pop_front()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(
        &self,
        request: &LlmRequest,
        options: &CompletionOptions,
    ) -> Result<TextResult, ProviderError> {
        let start = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.lock();
            state.requests.push(request.clone());
            state.options.push(options.clone());
        }

        let response = self
            .next_response(request)
            .ok_or_else(|| ProviderError::Configuration {
                message: format!(
                    "MockProvider: no response for purpose {:?}",
                    request.purpose
                ),
            })?;

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = response.error {
            return Err(error);
        }

        Ok(TextResult::new(
            response.content,
            TransportKind::InProcess,
            start.elapsed(),
        ))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("name", &self.name)
            .field("remaining_responses", &self.remaining_responses())
            .field("calls", &self.call_count())
            .finish()
    }
}
