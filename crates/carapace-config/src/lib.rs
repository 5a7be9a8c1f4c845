//! # carapace-config
//!
//! Configuration for the Carapace gateway, loaded from `carapace.toml`.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{AgentConfig, CarapaceConfig, GatewayConfig, SessionConfig};
