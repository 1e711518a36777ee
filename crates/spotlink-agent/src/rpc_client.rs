//! [`RpcClient`] – the agent's side of the JSON-RPC tool protocol.
//!
//! One request is in flight at a time; replies whose `id` does not match the
//! outstanding request are skipped.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("connection closed by the tool server")]
    Closed,
    /// The server answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("unexpected response: {0}")]
    BadResponse(String),
}

impl RpcError {
    /// `true` when the connection is unusable and must be re-established.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::Closed)
    }
}

pub struct RpcClient {
    ws: WsStream,
    url: String,
    next_id: u64,
}

impl RpcClient {
    /// Open a WebSocket connection to `url` (e.g. `ws://127.0.0.1:8000`).
    pub async fn connect(url: &str) -> Result<Self, RpcError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| RpcError::Transport(format!("connect to {url}: {e}")))?;
        info!(url, "connected to tool server");
        Ok(Self {
            ws,
            url: url.to_string(),
            next_id: 1,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one request and wait for the reply carrying the same id.
    pub async fn request(&mut self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id;
        self.next_id += 1;
        let frame = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        self.ws
            .send(Message::Text(frame.to_string().into()))
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        while let Some(msg) = self.ws.next().await {
            let text = match msg.map_err(|e| RpcError::Transport(e.to_string()))? {
                Message::Text(text) => text,
                Message::Close(_) => return Err(RpcError::Closed),
                _ => continue,
            };
            let reply: Value = serde_json::from_str(text.as_str())
                .map_err(|e| RpcError::BadResponse(e.to_string()))?;
            if reply.get("id").and_then(Value::as_u64) != Some(id) {
                debug!(expected = id, "skipping reply for another request");
                continue;
            }
            return parse_reply(reply);
        }
        Err(RpcError::Closed)
    }

    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value, RpcError> {
        self.request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await
    }

    /// Names of the tools the server advertises.
    pub async fn list_tools(&mut self) -> Result<Vec<String>, RpcError> {
        let result = self.request("tools/list", Value::Null).await?;
        let tools = result
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| RpcError::BadResponse("tools/list without a tools array".into()))?;
        Ok(tools
            .iter()
            .filter_map(|t| t.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    pub async fn close(mut self) {
        // The server may already be gone.
        let _ = self.ws.close(None).await;
    }
}

fn parse_reply(mut reply: Value) -> Result<Value, RpcError> {
    if let Some(error) = reply.get("error") {
        return Err(RpcError::Remote {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    reply
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| RpcError::BadResponse("reply has neither result nor error".into()))
}
