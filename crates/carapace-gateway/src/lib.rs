//! # carapace-gateway
//!
//! The WebSocket RPC front door. Provides:
//!
//! - Bearer-token handshake auth (header or `token=` query parameter)
//! - A JSON envelope protocol with id-correlated, out-of-order replies
//! - A method router the binary wires agent and session handlers into

pub mod router;
pub mod rpc;
pub mod server;

pub use router::MethodRouter;
pub use rpc::{ERR_INTERNAL, ERR_METHOD_NOT_FOUND, RpcError, RpcRequest, RpcResponse};
pub use server::Gateway;
