//! # carapace-session
//!
//! The session store: an in-memory map of conversations backed by one
//! append-only JSONL log per session. The log is the durable source of
//! truth; memory is a cache that can be rebuilt from disk at any time.

pub mod store;

pub use store::{Session, SessionStore};
