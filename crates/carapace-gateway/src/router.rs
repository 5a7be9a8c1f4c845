//! Method dispatch table for RPC calls.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use carapace_core::{CarapaceError, Result};

type BoxFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
type Handler = Arc<dyn Fn(Value) -> BoxFuture + Send + Sync>;

/// Maps method names to async handlers taking the request `params`.
#[derive(Default, Clone)]
pub struct MethodRouter {
    handlers: HashMap<String, Handler>,
}

impl MethodRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `method`. Re-registering replaces the old
    /// handler.
    pub fn register<F, Fut>(&mut self, method: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.handlers.insert(
            method.to_string(),
            Arc::new(move |params| Box::pin(handler(params))),
        );
    }

    pub fn methods(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Routes one call. Unknown methods return
    /// [`CarapaceError::MethodNotFound`].
    pub async fn route(&self, method: &str, params: Value) -> Result<Value> {
        let handler = self
            .handlers
            .get(method)
            .ok_or_else(|| CarapaceError::MethodNotFound(method.to_string()))?;
        debug!(method, "routing rpc call");
        handler(params).await
    }
}
