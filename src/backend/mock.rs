//! Mock backend for testing without a live LLM.
//!
//! [`MockBackend`] returns pre-configured replies in order, allowing
//! deterministic pipeline tests. Replies can be successes or failures, and
//! every prompt received is captured for later assertions.
//!
//! # Example
//!
//! ```
//! use prompt_pipeline::backend::{MockBackend, MockReply};
//!
//! let mock = MockBackend::scripted(vec![
//!     MockReply::text("Translated text"),
//!     MockReply::error("LLM error on step 2"),
//! ]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Backend, LlmRequest, LlmResponse};
use crate::error::Result;
use crate::PipelineError;

/// Number of prompt characters echoed back in echo mode.
const ECHO_PREFIX_CHARS: usize = 100;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Error(String),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        MockReply::Error(message.into())
    }
}

/// A test backend that returns scripted replies in order.
///
/// Cycles back to the beginning when all replies have been consumed.
/// With no script ([`MockBackend::echo`]) it answers
/// `Mock response for: <first 100 chars of the prompt>`.
#[derive(Debug)]
pub struct MockBackend {
    replies: Vec<MockReply>,
    index: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    /// Create a mock backend with the given canned text responses.
    pub fn new(responses: Vec<String>) -> Self {
        Self::scripted(responses.into_iter().map(MockReply::Text).collect())
    }

    /// Create a mock backend from a mixed script of successes and failures.
    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self {
            replies,
            index: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Create a mock that echoes a prefix of each prompt.
    pub fn echo() -> Self {
        Self::scripted(Vec::new())
    }

    /// Prompts received so far, in call order.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    fn next_reply(&self, prompt: &str) -> MockReply {
        let idx = self.index.fetch_add(1, Ordering::Relaxed);
        if self.replies.is_empty() {
            let prefix: String = prompt.chars().take(ECHO_PREFIX_CHARS).collect();
            return MockReply::Text(format!("Mock response for: {}", prefix));
        }
        self.replies[idx % self.replies.len()].clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.prompts.lock().await.push(request.prompt.clone());
        match self.next_reply(&request.prompt) {
            MockReply::Text(text) => Ok(LlmResponse {
                text,
                status: 200,
                metadata: Default::default(),
            }),
            MockReply::Error(message) => Err(PipelineError::Other(message)),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn models(&self) -> Vec<String> {
        vec!["mock-model".to_string()]
    }
}
