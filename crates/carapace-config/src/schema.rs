use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration — maps to `carapace.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CarapaceConfig {
    pub gateway: GatewayConfig,
    pub agent: AgentConfig,
    pub session: SessionConfig,
}

// ── Gateway ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the WebSocket gateway binds to.
    pub listen: String,
    /// Bearer token expected from connecting clients. When unset, every
    /// connection is accepted (a warning is logged at startup).
    pub auth_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:18789".into(),
            auth_token: None,
        }
    }
}

// ── Agent ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model identifier sent to the backend.
    pub model: String,
    /// API key for the LLM backend. Falls back to ANTHROPIC_API_KEY.
    pub api_key: Option<String>,
    /// Override backend base URL. A non-Anthropic URL switches the provider
    /// into Bedrock-style invoke routing.
    pub base_url: Option<String>,
    /// System prompt override. When unset the workspace IDENTITY.md is
    /// tried, then the built-in default.
    pub system_prompt: Option<String>,
    /// Maximum tokens per response.
    pub max_tokens: u32,
    /// Maximum tool-use iterations per turn before forcing a stop.
    pub max_iterations: u32,
    /// Approximate token ceiling for the context sent per LLM call.
    pub context_token_budget: usize,
    /// Maximum outer iterations for the completion-marker loop.
    pub max_ralph_iterations: u32,
    /// Connect/read timeout for LLM calls, seconds.
    pub llm_timeout_secs: u64,
    /// Per-tool-invocation timeout, seconds.
    pub tool_timeout_secs: u64,
    /// Maximum attempts for a retryable LLM failure.
    pub retry_max_attempts: u32,
    /// Initial retry delay; doubles per attempt up to a fixed cap.
    pub retry_initial_delay_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".into(),
            api_key: None,
            base_url: None,
            system_prompt: None,
            max_tokens: 4096,
            max_iterations: 10,
            context_token_budget: 100_000,
            max_ralph_iterations: 20,
            llm_timeout_secs: 120,
            tool_timeout_secs: 120,
            retry_max_attempts: 3,
            retry_initial_delay_ms: 1000,
        }
    }
}

// ── Sessions ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding one append-only JSONL log per session.
    /// When unset: ~/.carapace/sessions.
    pub dir: Option<PathBuf>,
    /// Idle seconds before a session is evicted from memory (disk retained).
    pub ttl_secs: u64,
    /// Interval between eviction sweeps, seconds.
    pub eviction_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_secs: 24 * 60 * 60,
            eviction_interval_secs: 15 * 60,
        }
    }
}

impl SessionConfig {
    /// Resolve the session log directory, defaulting under the home dir.
    pub fn resolve_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.dir {
            return dir.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".carapace")
            .join("sessions")
    }
}
