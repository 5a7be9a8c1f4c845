use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in a conversation. Tagged by role so one JSONL line is a
/// self-contained record of who said what and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
        timestamp: DateTime<Utc>,
    },
    User {
        content: String,
        timestamp: DateTime<Utc>,
    },
    Assistant {
        content: String,
        timestamp: DateTime<Utc>,
    },
    /// Output of one tool invocation, correlated back to the `tool_use`
    /// block that requested it.
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
        timestamp: DateTime<Utc>,
    },
    /// The assistant's own tool-use turn, stored block-for-block so the next
    /// API call can replay exactly the ids the backend issued.
    AssistantToolUse {
        content_blocks: Vec<ContentBlock>,
        timestamp: DateTime<Utc>,
    },
}

/// A single content block within an assistant response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant_tool_use(content_blocks: Vec<ContentBlock>) -> Self {
        Self::AssistantToolUse {
            content_blocks,
            timestamp: Utc::now(),
        }
    }

    /// The wire-level role name, matching the serde tag.
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool_result",
            Self::AssistantToolUse { .. } => "assistant_tool_use",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::System { timestamp, .. }
            | Self::User { timestamp, .. }
            | Self::Assistant { timestamp, .. }
            | Self::ToolResult { timestamp, .. }
            | Self::AssistantToolUse { timestamp, .. } => *timestamp,
        }
    }

    /// Plain text content, empty for tool-use-only messages.
    pub fn text_content(&self) -> &str {
        match self {
            Self::System { content, .. }
            | Self::User { content, .. }
            | Self::Assistant { content, .. }
            | Self::ToolResult { content, .. } => content,
            Self::AssistantToolUse { .. } => "",
        }
    }

    /// Estimate token count for this message.
    /// Uses a simple heuristic: ~4 chars per token for English text.
    pub fn estimate_tokens(&self) -> usize {
        // Role overhead (~4 tokens for role markers)
        let mut chars = 16usize;

        match self {
            Self::System { content, .. }
            | Self::User { content, .. }
            | Self::Assistant { content, .. } => chars += content.len(),
            Self::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                chars += tool_use_id.len();
                chars += content.len();
            }
            Self::AssistantToolUse { content_blocks, .. } => {
                for block in content_blocks {
                    match block {
                        ContentBlock::Text { text } => chars += text.len(),
                        ContentBlock::ToolUse { id, name, input } => {
                            chars += id.len();
                            chars += name.len();
                            chars += input.to_string().len();
                        }
                    }
                }
            }
        }

        // ~4 chars per token, minimum 1
        (chars / 4).max(1)
    }
}
