use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request from the LLM to invoke a named tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// The result of executing one tool invocation. Produced once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
            exit_code: Some(0),
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
            exit_code: Some(1),
        }
    }
}

/// Machine-readable tool definition attached to each LLM request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Trait implemented by every agent capability. Concrete tools live outside
/// this workspace; the loop only sees this four-operation contract.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name for this tool (sent to the LLM).
    fn name(&self) -> &str;

    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// JSON Schema describing the expected input parameters.
    fn input_schema(&self) -> Value;

    /// Execute the tool with the given input and return the result.
    async fn execute(&self, input: Value) -> crate::Result<ToolResult>;
}

impl dyn Tool {
    /// The serializable (name, description, schema) triple for this tool.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}
