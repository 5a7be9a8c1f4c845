//! # carapace-agent
//!
//! The agent orchestration loop: appends the user turn, iterates LLM calls
//! and tool dispatch against the session store, and returns final text.

pub mod dispatch;
pub mod executor;
pub mod prompt;
pub mod ralph;

pub use dispatch::{ToolRegistry, dispatch_tool_uses};
pub use executor::AgentExecutor;
pub use prompt::SystemPromptBuilder;
pub use ralph::DEFAULT_SENTINEL;
