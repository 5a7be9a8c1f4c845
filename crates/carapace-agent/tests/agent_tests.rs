//! End-to-end tests for the agent loop against the mock LLM provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use carapace_agent::{AgentExecutor, ToolRegistry, dispatch_tool_uses};
use carapace_config::AgentConfig;
use carapace_core::{Message, Tool, ToolResult, ToolUse};
use carapace_llm::MockProvider;
use carapace_session::SessionStore;

fn test_store(dir: &std::path::Path) -> Arc<SessionStore> {
    Arc::new(
        SessionStore::open(
            dir.to_path_buf(),
            Duration::from_secs(86_400),
            Duration::from_secs(900),
        )
        .unwrap(),
    )
}

fn executor_with(
    dir: &std::path::Path,
    provider: MockProvider,
    registry: ToolRegistry,
    config: AgentConfig,
) -> (AgentExecutor, Arc<SessionStore>) {
    let store = test_store(dir);
    let executor = AgentExecutor::new(
        config,
        Arc::clone(&store),
        Arc::new(provider),
        Arc::new(registry),
    )
    .with_system_prompt("test system prompt");
    (executor, store)
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes its input back"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }

    async fn execute(&self, input: Value) -> carapace_core::Result<ToolResult> {
        let text = input["text"].as_str().unwrap_or_default();
        Ok(ToolResult::success(format!("echo: {text}")))
    }
}

/// Sleeps for the configured duration, then returns its label.
struct SleepTool {
    label: &'static str,
    sleep_ms: u64,
}

#[async_trait]
impl Tool for SleepTool {
    fn name(&self) -> &str {
        self.label
    }

    fn description(&self) -> &str {
        "Sleeps then answers"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _input: Value) -> carapace_core::Result<ToolResult> {
        tokio::time::sleep(Duration::from_millis(self.sleep_ms)).await;
        Ok(ToolResult::success(self.label.to_string()))
    }
}

struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "panicky"
    }

    fn description(&self) -> &str {
        "Panics instead of answering"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _input: Value) -> carapace_core::Result<ToolResult> {
        panic!("tool blew up")
    }
}

struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _input: Value) -> carapace_core::Result<ToolResult> {
        Err(carapace_core::CarapaceError::ToolExecution {
            tool: "broken".into(),
            reason: "disk on fire".into(),
        })
    }
}

mod execute {
    use super::*;

    #[tokio::test]
    async fn test_plain_turn_appends_user_and_assistant() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_response("hi there");
        let (executor, store) =
            executor_with(dir.path(), provider, ToolRegistry::new(), AgentConfig::default());

        let session = store.create_session("test", "alice");
        let reply = executor.execute(session.id, "hello").await.unwrap();
        assert_eq!(reply, "hi there");

        let messages = store.messages(session.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role(), "user");
        assert_eq!(messages[0].text_content(), "hello");
        assert_eq!(messages[1].role(), "assistant");
        assert_eq!(messages[1].text_content(), "hi there");
    }

    #[tokio::test]
    async fn test_unknown_session_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_response("unused");
        let (executor, _store) =
            executor_with(dir.path(), provider, ToolRegistry::new(), AgentConfig::default());

        let err = executor.execute(Uuid::new_v4(), "hello").await.unwrap_err();
        assert!(matches!(
            err,
            carapace_core::CarapaceError::SessionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_tool_loop_records_full_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .with_tool_use("tu_1", "echo", json!({"text": "ping"}))
            .with_response("the tool said ping");
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let (executor, store) =
            executor_with(dir.path(), provider.clone(), registry, AgentConfig::default());

        let session = store.create_session("test", "alice");
        let reply = executor.execute(session.id, "run echo").await.unwrap();
        assert_eq!(reply, "the tool said ping");

        let messages = store.messages(session.id).unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role(), "user");
        assert_eq!(messages[1].role(), "assistant_tool_use");
        assert_eq!(messages[2].role(), "tool_result");
        assert_eq!(messages[3].role(), "assistant");

        let Message::ToolResult {
            tool_use_id,
            content,
            is_error,
            ..
        } = &messages[2]
        else {
            panic!("expected tool_result");
        };
        assert_eq!(tool_use_id, "tu_1");
        assert_eq!(content, "echo: ping");
        assert!(!*is_error);

        // Second provider call replays the tool exchange.
        assert_eq!(provider.request_count(), 2);
    }

    #[tokio::test]
    async fn test_unregistered_tool_yields_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .with_tool_use("tu_9", "foo", json!({}))
            .with_response("sorry, no such tool");
        let (executor, store) =
            executor_with(dir.path(), provider, ToolRegistry::new(), AgentConfig::default());

        let session = store.create_session("test", "alice");
        executor.execute(session.id, "use foo").await.unwrap();

        let messages = store.messages(session.id).unwrap();
        let Message::ToolResult {
            tool_use_id,
            content,
            is_error,
            ..
        } = &messages[2]
        else {
            panic!("expected tool_result");
        };
        assert_eq!(tool_use_id, "tu_9");
        assert!(content.contains("Unknown tool: foo"));
        assert!(*is_error);
    }

    #[tokio::test]
    async fn test_tool_failure_becomes_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .with_tool_use("tu_2", "broken", json!({}))
            .with_response("that did not work");
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool));
        let (executor, store) =
            executor_with(dir.path(), provider, registry, AgentConfig::default());

        let session = store.create_session("test", "alice");
        executor.execute(session.id, "break it").await.unwrap();

        let messages = store.messages(session.id).unwrap();
        let Message::ToolResult {
            content, is_error, ..
        } = &messages[2]
        else {
            panic!("expected tool_result");
        };
        assert!(content.starts_with("Error:"));
        assert!(content.contains("disk on fire"));
        assert!(*is_error);
    }

    #[tokio::test]
    async fn test_tool_panic_still_yields_a_reply() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .with_tool_use("tu_3", "panicky", json!({}))
            .with_response("that tool crashed");
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PanickingTool));
        let (executor, store) =
            executor_with(dir.path(), provider, registry, AgentConfig::default());

        let session = store.create_session("test", "alice");
        let reply = executor.execute(session.id, "crash it").await.unwrap();
        assert_eq!(reply, "that tool crashed");

        let messages = store.messages(session.id).unwrap();
        let Message::ToolResult {
            tool_use_id,
            is_error,
            ..
        } = &messages[2]
        else {
            panic!("expected tool_result");
        };
        assert_eq!(tool_use_id, "tu_3");
        assert!(*is_error);
    }

    #[tokio::test]
    async fn test_provider_error_is_reported_as_assistant_message() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_error("upstream unavailable");
        let (executor, store) =
            executor_with(dir.path(), provider, ToolRegistry::new(), AgentConfig::default());

        let session = store.create_session("test", "alice");
        let reply = executor.execute(session.id, "hello").await.unwrap();
        assert!(reply.starts_with("Error:"));
        assert!(reply.contains("upstream unavailable"));

        let messages = store.messages(session.id).unwrap();
        assert_eq!(messages.last().unwrap().role(), "assistant");
        assert!(messages.last().unwrap().text_content().starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_iteration_cap_produces_fixed_message() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = MockProvider::new();
        for i in 0..3 {
            provider = provider.with_tool_use(&format!("tu_{i}"), "echo", json!({"text": "go"}));
        }
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let config = AgentConfig {
            max_iterations: 3,
            ..AgentConfig::default()
        };
        let (executor, store) = executor_with(dir.path(), provider, registry, config);

        let session = store.create_session("test", "alice");
        let reply = executor.execute(session.id, "loop forever").await.unwrap();
        assert!(reply.contains("maximum number of tool steps (3)"));
    }

    #[tokio::test]
    async fn test_context_is_truncated_to_budget() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .with_response("first")
            .with_response("second");
        let config = AgentConfig {
            context_token_budget: 120,
            ..AgentConfig::default()
        };
        let (executor, store) =
            executor_with(dir.path(), provider.clone(), ToolRegistry::new(), config);

        let session = store.create_session("test", "alice");
        // Long first turn so the second call has to drop it.
        let filler = "x".repeat(400);
        executor.execute(session.id, &filler).await.unwrap();
        executor.execute(session.id, "short follow-up").await.unwrap();

        let requests = provider.requests.lock().clone();
        let second = &requests[1].messages;
        assert_eq!(second[0].role(), "system");
        // A truncation notice replaces the dropped history.
        assert_eq!(second[1].role(), "user");
        assert!(second[1].text_content().contains("earlier messages were omitted"));
        assert_eq!(
            second.last().unwrap().text_content(),
            "short follow-up"
        );
    }

    #[tokio::test]
    async fn test_system_prompt_is_first_context_message() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_response("ok");
        let (executor, store) = executor_with(
            dir.path(),
            provider.clone(),
            ToolRegistry::new(),
            AgentConfig::default(),
        );

        let session = store.create_session("test", "alice");
        executor.execute(session.id, "hi").await.unwrap();

        let requests = provider.requests.lock().clone();
        assert_eq!(requests[0].messages[0].role(), "system");
        assert_eq!(requests[0].messages[0].text_content(), "test system prompt");
    }
}

mod dispatch {
    use super::*;

    #[tokio::test]
    async fn test_results_keep_request_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SleepTool {
            label: "slow",
            sleep_ms: 80,
        }));
        registry.register(Arc::new(SleepTool {
            label: "fast",
            sleep_ms: 1,
        }));

        let requests = vec![
            ToolUse {
                id: "tu_a".into(),
                name: "slow".into(),
                input: json!({}),
            },
            ToolUse {
                id: "tu_b".into(),
                name: "fast".into(),
                input: json!({}),
            },
        ];

        let results = dispatch_tool_uses(&registry, &requests, Duration::from_secs(5)).await;
        assert_eq!(results.len(), 2);
        // Fast finishes first but the slow result still comes back in slot 0.
        assert_eq!(results[0].output, "slow");
        assert_eq!(results[1].output, "fast");
    }

    #[tokio::test]
    async fn test_timeout_produces_error_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SleepTool {
            label: "glacial",
            sleep_ms: 5_000,
        }));

        let requests = vec![ToolUse {
            id: "tu_t".into(),
            name: "glacial".into(),
            input: json!({}),
        }];

        let results = dispatch_tool_uses(&registry, &requests, Duration::from_millis(50)).await;
        assert!(results[0].is_error);
        assert!(results[0].output.contains("glacial"));
        assert!(results[0].output.contains("timed out"));
    }

    #[tokio::test]
    async fn test_single_invocation_panic_becomes_error_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PanickingTool));

        let requests = vec![ToolUse {
            id: "tu_p".into(),
            name: "panicky".into(),
            input: json!({}),
        }];

        let results = dispatch_tool_uses(&registry, &requests, Duration::from_secs(1)).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error);
        assert!(results[0].output.contains("panicked"));
    }

    #[tokio::test]
    async fn test_fanout_panic_does_not_abort_siblings() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PanickingTool));
        registry.register(Arc::new(EchoTool));

        let requests = vec![
            ToolUse {
                id: "tu_p".into(),
                name: "panicky".into(),
                input: json!({}),
            },
            ToolUse {
                id: "tu_e".into(),
                name: "echo".into(),
                input: json!({"text": "still here"}),
            },
        ];

        let results = dispatch_tool_uses(&registry, &requests, Duration::from_secs(1)).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_error);
        assert!(results[0].output.contains("panicked"));
        assert_eq!(results[1].output, "echo: still here");
    }

    #[tokio::test]
    async fn test_empty_request_list() {
        let registry = ToolRegistry::new();
        let results = dispatch_tool_uses(&registry, &[], Duration::from_secs(1)).await;
        assert!(results.is_empty());
    }
}

mod ralph {
    use super::*;

    #[tokio::test]
    async fn test_stops_when_sentinel_appears() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .with_response("working on step 1")
            .with_response("working on step 2")
            .with_response("working on step 3")
            .with_response("all done. TASK_COMPLETE");
        let (executor, store) = executor_with(
            dir.path(),
            provider.clone(),
            ToolRegistry::new(),
            AgentConfig::default(),
        );

        let session = store.create_session("test", "alice");
        let final_text = executor
            .run_until_complete(session.id, "build the thing", "TASK_COMPLETE")
            .await
            .unwrap();
        assert!(final_text.contains("TASK_COMPLETE"));
        assert_eq!(provider.request_count(), 4);

        // Continuation turns tell the agent what marker to emit.
        let messages = store.messages(session.id).unwrap();
        let continue_turns: Vec<_> = messages
            .iter()
            .filter(|m| m.role() == "user" && m.text_content().contains("Continue working"))
            .collect();
        assert_eq!(continue_turns.len(), 3);
        assert!(continue_turns[0].text_content().contains("TASK_COMPLETE"));
    }

    #[tokio::test]
    async fn test_sentinel_in_first_response_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_response("trivial. TASK_COMPLETE");
        let (executor, store) = executor_with(
            dir.path(),
            provider.clone(),
            ToolRegistry::new(),
            AgentConfig::default(),
        );

        let session = store.create_session("test", "alice");
        executor
            .run_until_complete(session.id, "easy task", "TASK_COMPLETE")
            .await
            .unwrap();
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_turn_cap_returns_last_response() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .with_response("still going 1")
            .with_response("still going 2")
            .with_response("still going 3");
        let config = AgentConfig {
            max_ralph_iterations: 3,
            ..AgentConfig::default()
        };
        let (executor, store) =
            executor_with(dir.path(), provider.clone(), ToolRegistry::new(), config);

        let session = store.create_session("test", "alice");
        let final_text = executor
            .run_until_complete(session.id, "never ends", "TASK_COMPLETE")
            .await
            .unwrap();
        assert_eq!(final_text, "still going 3");
        assert_eq!(provider.request_count(), 3);
    }
}
