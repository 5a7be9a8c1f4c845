use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use carapace_core::{CarapaceError, ContentBlock, Message, Result, ToolSpec};

use crate::provider::{LlmProvider, LlmResponse, StopReason};
use crate::retry::Backoff;

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic messages-API client. A non-Anthropic `base_url` switches into
/// Bedrock-style invoke routing (`{base}/model/{model}/invoke`).
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: Option<String>,
    bedrock_mode: bool,
    max_tokens: u32,
    max_attempts: u32,
    initial_delay: Duration,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: None,
            bedrock_mode: false,
            max_tokens: 4096,
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        let trimmed = url.trim_end_matches('/').to_string();
        self.bedrock_mode = !trimmed.is_empty() && !trimmed.contains("api.anthropic.com");
        self.base_url = Some(trimmed);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, initial_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.initial_delay = initial_delay;
        self
    }

    fn resolve_url(&self, model: &str) -> String {
        match (&self.base_url, self.bedrock_mode) {
            (Some(base), true) => format!("{base}/model/{model}/invoke"),
            (Some(base), false) => base.clone(),
            (None, _) => DEFAULT_API_URL.to_string(),
        }
    }

    /// Translate the internal message sequence to the backend's wire shape.
    /// The system message becomes the top-level `system` field; consecutive
    /// `tool_result` messages merge into one user turn (the protocol groups
    /// same-turn tool outputs); `assistant_tool_use` messages replay their
    /// stored blocks verbatim so the backend sees the ids it issued.
    fn build_request_body(&self, messages: &[Message], model: &str, tools: &[ToolSpec]) -> Value {
        let mut wire_messages: Vec<Value> = Vec::new();
        let mut system_prompt: Option<&str> = None;
        // Index of the user turn currently collecting tool_result blocks
        let mut open_tool_turn: Option<usize> = None;

        for msg in messages {
            match msg {
                Message::System { content, .. } => {
                    system_prompt = Some(content);
                    open_tool_turn = None;
                }
                Message::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                    ..
                } => {
                    let mut block = json!({
                        "type": "tool_result",
                        "tool_use_id": tool_use_id,
                        "content": content,
                    });
                    if *is_error {
                        block["is_error"] = json!(true);
                    }
                    match open_tool_turn {
                        Some(i) => {
                            if let Some(arr) = wire_messages[i]["content"].as_array_mut() {
                                arr.push(block);
                            }
                        }
                        None => {
                            wire_messages.push(json!({"role": "user", "content": [block]}));
                            open_tool_turn = Some(wire_messages.len() - 1);
                        }
                    }
                }
                Message::AssistantToolUse { content_blocks, .. } => {
                    // ContentBlock's serde shape is the wire shape
                    wire_messages.push(json!({
                        "role": "assistant",
                        "content": content_blocks,
                    }));
                    open_tool_turn = None;
                }
                Message::User { content, .. } => {
                    wire_messages.push(json!({"role": "user", "content": content}));
                    open_tool_turn = None;
                }
                Message::Assistant { content, .. } => {
                    wire_messages.push(json!({"role": "assistant", "content": content}));
                    open_tool_turn = None;
                }
            }
        }

        let mut body = json!({
            "max_tokens": self.max_tokens,
            "messages": wire_messages,
        });

        if self.bedrock_mode {
            body["anthropic_version"] = json!("bedrock-2023-05-31");
        } else {
            body["model"] = json!(model);
        }

        if let Some(system) = system_prompt {
            body["system"] = json!(system);
        }

        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        body
    }

    async fn execute_with_retry(&self, url: &str, body: &Value) -> Result<Value> {
        let mut backoff = Backoff::new(self.initial_delay);

        for attempt in 1..=self.max_attempts {
            let mut request = self
                .client
                .post(url)
                .header("x-api-key", &self.api_key)
                .header("content-type", "application/json");
            if !self.bedrock_mode {
                request = request.header("anthropic-version", "2023-06-01");
            }

            match request.json(body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<Value>()
                        .await
                        .map_err(|e| CarapaceError::LlmProvider(e.to_string()));
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let text = resp.text().await.unwrap_or_default();
                    let retryable = status == 429 || status >= 500;
                    if !retryable || attempt == self.max_attempts {
                        return Err(CarapaceError::LlmApi { status, body: text });
                    }
                    let delay = backoff.next_delay();
                    warn!(
                        status,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retryable API error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if attempt == self.max_attempts {
                        return Err(CarapaceError::RetriesExhausted {
                            attempts: self.max_attempts,
                            last_error: e.to_string(),
                        });
                    }
                    let delay = backoff.next_delay();
                    warn!(
                        error = %e,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "network error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(CarapaceError::RetriesExhausted {
            attempts: self.max_attempts,
            last_error: "no attempts made".into(),
        })
    }

    fn parse_response(data: &Value) -> LlmResponse {
        let stop_reason = StopReason::parse(data["stop_reason"].as_str().unwrap_or("end_turn"));

        let mut content = Vec::new();
        if let Some(blocks) = data["content"].as_array() {
            for block in blocks {
                match block["type"].as_str() {
                    Some("text") => {
                        if let Some(text) = block["text"].as_str() {
                            content.push(ContentBlock::Text {
                                text: text.to_string(),
                            });
                        }
                    }
                    Some("tool_use") => {
                        content.push(ContentBlock::ToolUse {
                            id: block["id"].as_str().unwrap_or("").to_string(),
                            name: block["name"].as_str().unwrap_or("").to_string(),
                            input: block["input"].clone(),
                        });
                    }
                    _ => {}
                }
            }
        }

        LlmResponse {
            stop_reason,
            content,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        messages: &[Message],
        model: &str,
        tools: &[ToolSpec],
    ) -> Result<LlmResponse> {
        let body = self.build_request_body(messages, model, tools);
        let url = self.resolve_url(model);
        debug!(model, url = %url, tools = tools.len(), "sending completion request");

        let data = self.execute_with_retry(&url, &body).await?;
        Ok(Self::parse_response(&data))
    }
}
