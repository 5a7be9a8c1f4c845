//! WebSocket endpoint and connection plumbing.
//!
//! Each accepted socket gets a dedicated writer task fed by an mpsc channel.
//! Inbound frames are handled on their own tasks, so slow calls never block
//! the socket; clients correlate replies by envelope `id`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket},
    },
    http::HeaderMap,
    response::Response,
    routing::any,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use carapace_core::CarapaceError;

use crate::router::MethodRouter;
use crate::rpc::{ERR_INTERNAL, RpcRequest, RpcResponse};

/// WS close status for failed auth.
const POLICY_VIOLATION: u16 = 1008;

struct GatewayState {
    router: MethodRouter,
    auth_token: Option<String>,
}

/// The WebSocket RPC gateway.
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    pub fn new(router: MethodRouter, auth_token: Option<String>) -> Self {
        if auth_token.is_none() {
            warn!("no gateway auth token configured — accepting ALL connections");
        }
        Self {
            state: Arc::new(GatewayState { router, auth_token }),
        }
    }

    /// Builds the axum app serving the `/ws` endpoint.
    pub fn into_app(self) -> Router {
        Router::new()
            .route("/ws", any(ws_handler))
            .with_state(self.state)
    }

    /// Binds `listen` and serves until the process exits.
    pub async fn serve(self, listen: &str) -> carapace_core::Result<()> {
        let listener = tokio::net::TcpListener::bind(listen)
            .await
            .map_err(|e| CarapaceError::Gateway(format!("failed to bind {listen}: {e}")))?;
        info!(listen, "gateway listening");
        self.serve_on(listener).await
    }

    /// Serves on an already-bound listener. Used by tests with an ephemeral
    /// port.
    pub async fn serve_on(self, listener: tokio::net::TcpListener) -> carapace_core::Result<()> {
        axum::serve(listener, self.into_app())
            .await
            .map_err(|e| CarapaceError::Gateway(format!("server error: {e}")))
    }
}

async fn ws_handler(
    State(state): State<Arc<GatewayState>>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let authorized = check_auth(&state, &headers, &query);
    ws.on_upgrade(move |socket| handle_socket(state, socket, authorized))
}

/// Compares the presented token against the configured one in constant
/// time. The token may arrive as `Authorization: Bearer <token>` or, for
/// clients that cannot set headers, as a `token=` query parameter.
fn check_auth(
    state: &GatewayState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> bool {
    let Some(ref expected) = state.auth_token else {
        return true;
    };

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| query.get("token").map(String::as_str));

    match provided {
        Some(token) => {
            ring::constant_time::verify_slices_are_equal(token.as_bytes(), expected.as_bytes())
                .is_ok()
        }
        None => false,
    }
}

async fn handle_socket(state: Arc<GatewayState>, socket: WebSocket, authorized: bool) {
    let (mut sender, mut receiver) = socket.split();

    if !authorized {
        warn!("rejecting websocket connection — invalid or missing token");
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: POLICY_VIOLATION,
                reason: "invalid token".into(),
            })))
            .await;
        return;
    }

    debug!("websocket connection established");

    // Single writer task; frame handlers send completed responses here.
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = receiver.next().await {
        match frame {
            Message::Text(text) => {
                let state = Arc::clone(&state);
                let tx = tx.clone();
                tokio::spawn(async move {
                    handle_frame(&state, text.to_string(), &tx).await;
                });
            }
            Message::Close(_) => break,
            // Ping/pong is handled by axum; binary frames are not part of
            // the protocol.
            _ => {}
        }
    }

    drop(tx);
    let _ = writer.await;
    debug!("websocket connection closed");
}

async fn handle_frame(state: &GatewayState, text: String, tx: &mpsc::Sender<String>) {
    let response = match serde_json::from_str::<RpcRequest>(&text) {
        Ok(request) => {
            let id = request.id.clone();
            match state.router.route(&request.method, request.params).await {
                Ok(result) => RpcResponse::ok(id, result),
                Err(e) => {
                    warn!(method = %request.method, error = %e, "rpc call failed");
                    RpcResponse::from_error(id, &e)
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "unparseable rpc frame");
            RpcResponse::err(
                serde_json::Value::Null,
                ERR_INTERNAL,
                format!("invalid request: {e}"),
            )
        }
    };

    match serde_json::to_string(&response) {
        Ok(text) => {
            let _ = tx.send(text).await;
        }
        Err(e) => warn!(error = %e, "failed to serialize rpc response"),
    }
}
