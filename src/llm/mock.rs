//! Scripted LLM backend for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use super::traits::*;

/// Backend that replays configured responses and counts calls.
///
/// Responses are served in order; the last one repeats.
pub struct MockBackend {
    model_id: String,
    provider: String,
    available: AtomicBool,
    responses: Mutex<Vec<String>>,
    last_request: Mutex<Option<CompletionRequest>>,
    call_count: AtomicU32,
}

impl MockBackend {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            model_id: "mock-model".to_string(),
            provider: provider.into(),
            available: AtomicBool::new(true),
            responses: Mutex::new(vec!["Mock response".to_string()]),
            last_request: Mutex::new(None),
            call_count: AtomicU32::new(0),
        }
    }

    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.with_responses([content.into()])
    }

    pub fn with_responses(self, contents: impl IntoIterator<Item = String>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            *responses = contents.into_iter().collect();
        }
        self
    }

    /// `false` makes every completion fail with `Unavailable`
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    fn provider(&self) -> &str {
        &self.provider
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) as usize;

        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable(format!("{} disabled", self.provider)));
        }

        let content = self
            .responses
            .lock()
            .ok()
            .and_then(|r| r.get(call).or_else(|| r.last()).cloned())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse(self.provider.clone()));
        }

        let prompt_tokens = request.prompt.len() as u32 / 4;
        let completion_tokens = content.len() as u32 / 4;

        Ok(CompletionResponse {
            content,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
            },
        })
    }
}
