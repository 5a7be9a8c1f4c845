//! # carapace-core
//!
//! Core types, traits, and primitives for the Carapace agent gateway.
//! This crate defines the shared vocabulary used by every other crate in the workspace.

pub mod error;
pub mod message;
pub mod tool;

pub use error::{CarapaceError, Result};
pub use message::{ContentBlock, Message};
pub use tool::{Tool, ToolResult, ToolSpec, ToolUse};
