use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use carapace_core::{Tool, ToolResult, ToolSpec, ToolUse};

/// Name-keyed registry of agent capabilities.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions sent to the LLM alongside each request.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.as_ref().spec()).collect()
    }
}

/// Execute a batch of tool invocations. A single invocation runs inline;
/// two or more fan out concurrently, each bounded by `timeout`. The result
/// list always matches the request order, whatever the completion order.
/// Every failure mode — unknown tool, tool error, panic, timeout — becomes
/// an error [`ToolResult`]; nothing propagates.
pub async fn dispatch_tool_uses(
    registry: &ToolRegistry,
    requests: &[ToolUse],
    timeout: Duration,
) -> Vec<ToolResult> {
    match requests {
        [] => Vec::new(),
        [single] => {
            // Spawned rather than awaited inline so a panicking tool is
            // contained the same way as on the fan-out path.
            let tool = registry.get(&single.name);
            let joined = tokio::spawn(run_one(tool, single.clone(), timeout)).await;
            vec![joined.unwrap_or_else(|e| {
                warn!(error = %e, "tool task panicked");
                ToolResult::error("tool task panicked")
            })]
        }
        many => {
            let mut join_set = JoinSet::new();
            for (idx, request) in many.iter().enumerate() {
                let tool = registry.get(&request.name);
                let request = request.clone();
                join_set.spawn(async move { (idx, run_one(tool, request, timeout).await) });
            }

            let mut results: Vec<Option<ToolResult>> = vec![None; many.len()];
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((idx, result)) => results[idx] = Some(result),
                    Err(e) => warn!(error = %e, "tool task panicked"),
                }
            }
            results
                .into_iter()
                .map(|r| r.unwrap_or_else(|| ToolResult::error("tool task panicked")))
                .collect()
        }
    }
}

async fn run_one(tool: Option<Arc<dyn Tool>>, request: ToolUse, timeout: Duration) -> ToolResult {
    let Some(tool) = tool else {
        warn!(tool = %request.name, "unknown tool requested");
        return ToolResult::error(format!("Unknown tool: {}", request.name));
    };

    debug!(tool = %request.name, id = %request.id, "executing tool");
    match tokio::time::timeout(timeout, tool.execute(request.input)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => ToolResult::error(format!("Error: {e}")),
        Err(_) => ToolResult::error(format!(
            "Tool {} timed out after {}s",
            request.name,
            timeout.as_secs()
        )),
    }
}
