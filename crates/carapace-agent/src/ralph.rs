use tracing::{info, warn};
use uuid::Uuid;

use crate::executor::AgentExecutor;

/// Default completion marker for autonomous runs.
pub const DEFAULT_SENTINEL: &str = "TASK_COMPLETE";

impl AgentExecutor {
    /// Autonomous multi-turn mode: runs the task, then keeps prompting the
    /// agent to continue until its response contains `sentinel` or the
    /// configured turn cap is hit. Returns the final assistant text.
    pub async fn run_until_complete(
        &self,
        session_id: Uuid,
        task: &str,
        sentinel: &str,
    ) -> carapace_core::Result<String> {
        let continue_prompt = format!(
            "Continue working on the task. Check your previous work for errors. \
             When everything is done, output {sentinel}"
        );

        let mut response = self.execute(session_id, task).await?;
        if response.contains(sentinel) {
            return Ok(response);
        }

        for turn in 2..=self.config().max_ralph_iterations {
            info!(session = %session_id, turn, "continuing autonomous run");
            response = self.execute(session_id, &continue_prompt).await?;
            if response.contains(sentinel) {
                info!(session = %session_id, turn, "autonomous run complete");
                return Ok(response);
            }
        }

        warn!(
            session = %session_id,
            max_turns = self.config().max_ralph_iterations,
            "autonomous run hit turn cap without completion marker"
        );
        Ok(response)
    }
}
