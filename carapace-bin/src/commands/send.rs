use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};

use carapace_config::CarapaceConfig;
use carapace_core::CarapaceError;

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// One-shot client: connect, resolve a session, send the message, print
/// the assistant's reply.
pub async fn cmd_send(
    config: CarapaceConfig,
    message: String,
    session: Option<String>,
    url: Option<String>,
    token: Option<String>,
    ralph: bool,
) -> carapace_core::Result<()> {
    let url = url.unwrap_or_else(|| format!("ws://{}/ws", config.gateway.listen));
    let token = token.or(config.gateway.auth_token);

    let mut request = url
        .clone()
        .into_client_request()
        .map_err(|e| CarapaceError::Gateway(format!("bad gateway url {url:?}: {e}")))?;
    if let Some(ref t) = token {
        let header = format!("Bearer {t}")
            .parse()
            .map_err(|_| CarapaceError::Gateway("auth token is not a valid header value".into()))?;
        request.headers_mut().insert("Authorization", header);
    }

    debug!(%url, "connecting to gateway");
    let (mut ws, _) = connect_async(request)
        .await
        .map_err(|e| CarapaceError::Gateway(format!("failed to connect to {url}: {e}")))?;

    let session_id = match session {
        Some(id) => id,
        None => {
            let user = std::env::var("USER").unwrap_or_else(|_| "cli".into());
            let result = rpc(
                &mut ws,
                1,
                "session.create",
                json!({"channel": "cli", "user_id": user}),
            )
            .await?;
            let id = result["session_id"]
                .as_str()
                .ok_or_else(|| {
                    CarapaceError::Gateway("session.create returned no session_id".into())
                })?
                .to_string();
            info!(session = %id, "created session");
            id
        }
    };

    let (method, params) = if ralph {
        (
            "agent.ralph",
            json!({"session_id": session_id, "task": message}),
        )
    } else {
        (
            "agent.send",
            json!({"session_id": session_id, "message": message}),
        )
    };

    let result = rpc(&mut ws, 2, method, params).await?;
    println!("{}", result["response"].as_str().unwrap_or_default());

    let _ = ws.close(None).await;
    Ok(())
}

/// Sends one request and waits for the reply with the matching id.
async fn rpc(ws: &mut Ws, id: u64, method: &str, params: Value) -> carapace_core::Result<Value> {
    let frame = json!({"id": id, "method": method, "params": params}).to_string();
    ws.send(Message::text(frame))
        .await
        .map_err(|e| CarapaceError::Gateway(format!("send failed: {e}")))?;

    while let Some(msg) = ws.next().await {
        let msg = msg.map_err(|e| CarapaceError::Gateway(format!("receive failed: {e}")))?;
        let Message::Text(text) = msg else {
            continue;
        };
        let response: Value = serde_json::from_str(&text)
            .map_err(|e| CarapaceError::Gateway(format!("bad response frame: {e}")))?;
        if response["id"] != json!(id) {
            continue;
        }
        if let Some(error) = response.get("error") {
            return Err(CarapaceError::Gateway(format!(
                "{} (code {})",
                error["message"].as_str().unwrap_or("unknown error"),
                error["code"]
            )));
        }
        return Ok(response["result"].clone());
    }

    Err(CarapaceError::Gateway(
        "connection closed before a reply arrived".into(),
    ))
}
