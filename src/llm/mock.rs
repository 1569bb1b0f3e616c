//! Scripted client for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{CompletionRequest, LlmClient, ProviderError};

type Responder = dyn Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync;

/// Mock LLM client. Returns queued responses in order, then a fallback.
///
/// Optionally routes by prompt content so concurrent verifier calls can get
/// deterministic answers regardless of scheduling.
pub struct MockLlmClient {
    model: String,
    queue: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: Result<String, ProviderError>,
    responder: Option<Box<Responder>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    /// Always answer with `response`.
    pub fn new(response: &str) -> Self {
        Self {
            model: "mock-model".to_string(),
            queue: Mutex::new(VecDeque::new()),
            fallback: Ok(response.to_string()),
            responder: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always fail with `error`.
    pub fn failing(error: ProviderError) -> Self {
        let mut mock = Self::new("");
        mock.fallback = Err(error);
        mock
    }

    /// Answer each call by inspecting the request.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        let mut mock = Self::new("");
        mock.responder = Some(Box::new(responder));
        mock
    }

    /// Queue responses consumed before the fallback.
    pub fn with_sequence(self, responses: Vec<Result<String, ProviderError>>) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(responses);
        }
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl LlmClient for MockLlmClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }

        if let Some(next) = self.queue.lock().ok().and_then(|mut q| q.pop_front()) {
            return next;
        }
        match &self.responder {
            Some(responder) => responder(request),
            None => self.fallback.clone(),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
