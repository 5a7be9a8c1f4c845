use thiserror::Error;

/// Unified error type for the entire Carapace runtime.
#[derive(Error, Debug)]
pub enum CarapaceError {
    // ── Session errors ─────────────────────────────────────────
    #[error("session not found: {0}")]
    SessionNotFound(String),

    // ── LLM errors ─────────────────────────────────────────────
    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("llm api error: HTTP {status}: {body}")]
    LlmApi { status: u16, body: String },

    #[error("llm retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    // ── Tool errors ────────────────────────────────────────────
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    // ── Gateway errors ─────────────────────────────────────────
    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CarapaceError>;
