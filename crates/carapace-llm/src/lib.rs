//! # carapace-llm
//!
//! LLM backend abstraction: the provider trait, the Anthropic messages-API
//! client with bounded retry, and a scripted mock for tests.

pub mod anthropic;
pub mod mock;
pub mod provider;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use mock::{MockProvider, MockResponse};
pub use provider::{LlmProvider, LlmResponse, StopReason};
pub use retry::Backoff;
