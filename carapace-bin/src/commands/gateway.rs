use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use carapace_agent::{AgentExecutor, DEFAULT_SENTINEL, ToolRegistry};
use carapace_config::CarapaceConfig;
use carapace_core::CarapaceError;
use carapace_gateway::{Gateway, MethodRouter};
use carapace_llm::AnthropicProvider;
use carapace_session::SessionStore;

#[derive(Deserialize)]
struct SessionCreateParams {
    channel: String,
    user_id: String,
}

#[derive(Deserialize)]
struct SendParams {
    session_id: String,
    message: String,
}

#[derive(Deserialize)]
struct RalphParams {
    session_id: String,
    task: String,
    sentinel: Option<String>,
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> carapace_core::Result<T> {
    serde_json::from_value(params).map_err(|e| CarapaceError::InvalidParams(e.to_string()))
}

fn parse_session_id(raw: &str) -> carapace_core::Result<Uuid> {
    raw.parse::<Uuid>()
        .map_err(|e| CarapaceError::InvalidParams(format!("bad session_id {raw:?}: {e}")))
}

/// Start the gateway: session store, agent runtime, and the WebSocket
/// front door.
pub async fn cmd_gateway(config: CarapaceConfig) -> carapace_core::Result<()> {
    let api_key = config.agent.api_key.clone().ok_or_else(|| {
        CarapaceError::Config(
            "no API key configured — set agent.api_key or ANTHROPIC_API_KEY".into(),
        )
    })?;

    let store = Arc::new(SessionStore::open(
        config.session.resolve_dir(),
        Duration::from_secs(config.session.ttl_secs),
        Duration::from_secs(config.session.eviction_interval_secs),
    )?);
    store.start_eviction();
    info!(sessions = store.session_count(), "session store ready");

    let mut provider = AnthropicProvider::new(api_key)
        .with_timeout(Duration::from_secs(config.agent.llm_timeout_secs))
        .with_max_tokens(config.agent.max_tokens)
        .with_retry(
            config.agent.retry_max_attempts,
            Duration::from_millis(config.agent.retry_initial_delay_ms),
        );
    if let Some(ref base_url) = config.agent.base_url {
        provider = provider.with_base_url(base_url.clone());
    }

    // Tool implementations plug in here; the default build ships none.
    let registry = Arc::new(ToolRegistry::new());

    let executor = Arc::new(AgentExecutor::new(
        config.agent.clone(),
        Arc::clone(&store),
        Arc::new(provider),
        registry,
    ));

    let router = build_router(Arc::clone(&executor), store);
    let gateway = Gateway::new(router, config.gateway.auth_token.clone());
    gateway.serve(&config.gateway.listen).await
}

fn build_router(executor: Arc<AgentExecutor>, store: Arc<SessionStore>) -> MethodRouter {
    let mut router = MethodRouter::new();

    {
        let store = Arc::clone(&store);
        router.register("gateway.health", move |_| {
            let store = Arc::clone(&store);
            async move {
                Ok(json!({
                    "status": "ok",
                    "version": env!("CARGO_PKG_VERSION"),
                    "sessions": store.session_count(),
                }))
            }
        });
    }

    {
        let store = Arc::clone(&store);
        router.register("session.create", move |params| {
            let store = Arc::clone(&store);
            async move {
                let p: SessionCreateParams = parse_params(params)?;
                let session = store.create_session(&p.channel, &p.user_id);
                info!(session = %session.id, channel = %p.channel, "session created");
                Ok(json!({ "session_id": session.id.to_string() }))
            }
        });
    }

    {
        let executor = Arc::clone(&executor);
        router.register("agent.send", move |params| {
            let executor = Arc::clone(&executor);
            async move {
                let p: SendParams = parse_params(params)?;
                let session_id = parse_session_id(&p.session_id)?;
                let response = executor.execute(session_id, &p.message).await?;
                Ok(json!({
                    "session_id": p.session_id,
                    "response": response,
                }))
            }
        });
    }

    {
        let executor = Arc::clone(&executor);
        router.register("agent.ralph", move |params| {
            let executor = Arc::clone(&executor);
            async move {
                let p: RalphParams = parse_params(params)?;
                let session_id = parse_session_id(&p.session_id)?;
                let sentinel = p.sentinel.as_deref().unwrap_or(DEFAULT_SENTINEL);
                let response = executor
                    .run_until_complete(session_id, &p.task, sentinel)
                    .await?;
                Ok(json!({
                    "session_id": p.session_id,
                    "response": response,
                }))
            }
        });
    }

    router
}
