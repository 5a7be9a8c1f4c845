//! Mock LLM provider for deterministic testing.
//!
//! Returns pre-scripted responses in order without making any HTTP calls.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use carapace_core::{CarapaceError, ContentBlock, Message, Result, ToolSpec};

use crate::provider::{LlmProvider, LlmResponse, StopReason};

/// A pre-scripted response from the mock provider.
#[derive(Clone)]
pub struct MockResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    /// If set, the provider returns this error instead.
    pub error: Option<String>,
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self {
            content: vec![ContentBlock::Text {
                text: text.to_string(),
            }],
            stop_reason: StopReason::EndTurn,
            error: None,
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            content: vec![],
            stop_reason: StopReason::EndTurn,
            error: Some(msg.to_string()),
        }
    }
}

/// A recorded request, for assertions in tests.
#[derive(Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub tools: Vec<ToolSpec>,
}

/// Scripted LLM provider: responses are consumed front-to-back; every
/// request is recorded.
#[derive(Clone, Default)]
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a simple text response.
    pub fn with_response(self, text: &str) -> Self {
        self.responses.lock().push_back(MockResponse::text(text));
        self
    }

    /// Queue a tool-use response with an explicit invocation id.
    pub fn with_tool_use(self, id: &str, name: &str, input: Value) -> Self {
        self.responses.lock().push_back(MockResponse {
            content: vec![ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
            error: None,
        });
        self
    }

    /// Queue an error response.
    pub fn with_error(self, msg: &str) -> Self {
        self.responses.lock().push_back(MockResponse::error(msg));
        self
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.responses.lock().push_back(resp);
        self
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        messages: &[Message],
        model: &str,
        tools: &[ToolSpec],
    ) -> Result<LlmResponse> {
        self.requests.lock().push(RecordedRequest {
            messages: messages.to_vec(),
            model: model.to_string(),
            tools: tools.to_vec(),
        });

        let next = self.responses.lock().pop_front().ok_or_else(|| {
            CarapaceError::LlmProvider("mock provider: no scripted response left".into())
        })?;

        if let Some(msg) = next.error {
            return Err(CarapaceError::LlmProvider(msg));
        }

        Ok(LlmResponse {
            stop_reason: next.stop_reason,
            content: next.content,
        })
    }
}
