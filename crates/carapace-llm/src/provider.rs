use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use carapace_core::{ContentBlock, Message, Result, ToolSpec, ToolUse};

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "tool_use" => Self::ToolUse,
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            _ => Self::EndTurn,
        }
    }
}

/// Structured response from the LLM: text and/or tool-use requests.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub stop_reason: StopReason,
    pub content: Vec<ContentBlock>,
}

impl LlmResponse {
    /// True if the model wants to invoke one or more tools.
    pub fn has_tool_use(&self) -> bool {
        self.stop_reason == StopReason::ToolUse
    }

    /// All text blocks joined into one string.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Only the tool-use blocks, in response order.
    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

/// Trait implemented by each LLM backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable name, e.g. "anthropic".
    fn name(&self) -> &str;

    /// One completion call: ordered context + tool catalog in, structured
    /// response out. Transient transport failures are retried internally.
    async fn complete(
        &self,
        messages: &[Message],
        model: &str,
        tools: &[ToolSpec],
    ) -> Result<LlmResponse>;
}
