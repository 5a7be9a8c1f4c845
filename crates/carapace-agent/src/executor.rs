use std::sync::Arc;
use std::time::Duration;

use carapace_config::AgentConfig;
use carapace_core::{CarapaceError, Message};
use carapace_llm::LlmProvider;
use carapace_session::SessionStore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dispatch::{dispatch_tool_uses, ToolRegistry};
use crate::prompt::SystemPromptBuilder;

/// Drives the tool-use loop for one conversation turn.
///
/// Every message that flows through the loop is appended to the session
/// store before the next provider call, so a crash mid-turn loses at most
/// the in-flight request.
pub struct AgentExecutor {
    config: AgentConfig,
    store: Arc<SessionStore>,
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    system_prompt: String,
}

impl AgentExecutor {
    pub fn new(
        config: AgentConfig,
        store: Arc<SessionStore>,
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        let system_prompt = SystemPromptBuilder::new(config.system_prompt.clone()).build();
        Self {
            config,
            store,
            provider,
            registry,
            system_prompt,
        }
    }

    /// Replaces the resolved system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Runs one user turn to completion and returns the assistant's final
    /// text. Provider and tool failures inside the loop are reported to the
    /// user as an `Error: ...` assistant message rather than propagated, so
    /// a flaky upstream never wedges the session.
    pub async fn execute(&self, session_id: Uuid, user_text: &str) -> carapace_core::Result<String> {
        if self.store.get_session(session_id).is_none() {
            return Err(CarapaceError::SessionNotFound(session_id.to_string()));
        }

        self.store
            .append_message(session_id, Message::user(user_text));

        let text = match self.run_loop(session_id).await {
            Ok(text) => text,
            Err(e) => {
                error!(session = %session_id, error = %e, "agent loop failed");
                format!("Error: {e}")
            }
        };

        self.store
            .append_message(session_id, Message::assistant(&text));
        Ok(text)
    }

    async fn run_loop(&self, session_id: Uuid) -> carapace_core::Result<String> {
        let tool_specs = self.registry.specs();
        let tool_timeout = Duration::from_secs(self.config.tool_timeout_secs);

        for iteration in 1..=self.config.max_iterations {
            let history = self
                .store
                .messages(session_id)
                .ok_or_else(|| CarapaceError::SessionNotFound(session_id.to_string()))?;
            let context = self.build_context(&history);

            debug!(
                session = %session_id,
                iteration,
                context_len = context.len(),
                "calling llm provider"
            );
            let response = self
                .provider
                .complete(&context, &self.config.model, &tool_specs)
                .await?;

            if !response.has_tool_use() {
                return Ok(response.text_content());
            }

            let tool_uses = response.tool_uses();
            info!(
                session = %session_id,
                iteration,
                tools = tool_uses.len(),
                "executing requested tools"
            );

            self.store.append_message(
                session_id,
                Message::assistant_tool_use(response.content.clone()),
            );

            let results = dispatch_tool_uses(&self.registry, &tool_uses, tool_timeout).await;
            for (use_req, result) in tool_uses.iter().zip(results) {
                self.store.append_message(
                    session_id,
                    Message::tool_result(&use_req.id, &result.output, result.is_error),
                );
            }
        }

        warn!(
            session = %session_id,
            max_iterations = self.config.max_iterations,
            "tool loop hit iteration cap"
        );
        Ok(format!(
            "I reached the maximum number of tool steps ({}) without finishing. \
             Please narrow the request or try again.",
            self.config.max_iterations
        ))
    }

    /// Assembles the provider context: the system prompt followed by as much
    /// recent history as fits the token budget.
    fn build_context(&self, history: &[Message]) -> Vec<Message> {
        let system = Message::system(&self.system_prompt);
        let budget = self
            .config
            .context_token_budget
            .saturating_sub(system.estimate_tokens());

        let mut context = vec![system];
        context.extend(truncated_view(history, budget));
        context
    }
}

/// Returns the suffix of `history` whose estimated token total fits
/// `budget`, newest messages kept first. When anything was dropped, a
/// user-role notice is prepended so the model knows the transcript is
/// incomplete.
pub(crate) fn truncated_view(history: &[Message], budget: usize) -> Vec<Message> {
    let mut used = 0usize;
    let mut start = history.len();
    for (idx, message) in history.iter().enumerate().rev() {
        let cost = message.estimate_tokens();
        if used + cost > budget {
            break;
        }
        used += cost;
        start = idx;
    }

    let omitted = start;
    let mut view: Vec<Message> = Vec::with_capacity(history.len() - start + 1);
    if omitted > 0 {
        debug!(omitted, "history exceeds context budget, truncating");
        view.push(Message::user(&format!(
            "[Note: {omitted} earlier messages were omitted to fit the context window.]"
        )));
    }
    view.extend_from_slice(&history[start..]);
    view
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_view_keeps_everything_under_budget() {
        let history = vec![Message::user("one"), Message::assistant("two")];
        let view = truncated_view(&history, 10_000);
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].text_content(), "one");
    }

    #[test]
    fn test_truncated_view_drops_oldest_and_prepends_notice() {
        let history: Vec<Message> = (0..20)
            .map(|i| Message::user(&format!("message number {i} {}", "x".repeat(200))))
            .collect();
        let per_message = history[0].estimate_tokens();
        let budget = per_message * 5 + per_message / 2;

        let view = truncated_view(&history, budget);
        // 5 kept + notice
        assert_eq!(view.len(), 6);
        assert!(view[0].text_content().contains("15 earlier messages"));
        assert!(view.last().unwrap().text_content().contains("number 19"));
    }

    #[test]
    fn test_truncated_view_zero_budget_keeps_only_notice() {
        let history = vec![Message::user("hello")];
        let view = truncated_view(&history, 0);
        assert_eq!(view.len(), 1);
        assert!(view[0].text_content().contains("1 earlier messages"));
    }
}
