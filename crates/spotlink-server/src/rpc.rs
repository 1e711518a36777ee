//! [`RpcServer`] – JSON-RPC 2.0 tool server over WebSocket.
//!
//! Every text frame carries one request; every request with an `id` gets
//! exactly one response frame.  Methods:
//!
//! * `tools/list` → `{ "tools": [ToolDescriptor, ...] }`
//! * `tools/call` with `params: { name, arguments }` → the tool's result
//! * `ping` → `{}`

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use spotlink_bridge::Bridge;
use spotlink_types::SpotError;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::tools::ToolRouter;

/// Default bind address of the tool server.
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

/// JSON-RPC 2.0 error codes.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

// ---------------------------------------------------------------------------
// RpcServer
// ---------------------------------------------------------------------------

/// WebSocket server exposing a [`ToolRouter`].
pub struct RpcServer {
    router: Arc<ToolRouter>,
    host: String,
    port: u16,
}

impl RpcServer {
    pub fn new(bridge: Bridge) -> Self {
        Self {
            router: Arc::new(ToolRouter::new(bridge)),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }

    /// Override the bind address (builder-style).  Port `0` picks a free port.
    pub fn with_addr(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind the listener without serving yet.
    ///
    /// # Errors
    ///
    /// [`SpotError::Transport`] if the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener, SpotError> {
        let addr = format!("{}:{}", self.host, self.port);
        TcpListener::bind(&addr)
            .await
            .map_err(|e| SpotError::Transport(format!("RPC server bind error on {addr}: {e}")))
    }

    /// Bind and serve forever.
    pub async fn run(self) -> Result<(), SpotError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve connections accepted on `listener`.
    pub async fn serve(self, listener: TcpListener) -> Result<(), SpotError> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "RPC tool server listening on ws://{addr}");
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let router = Arc::clone(&self.router);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, router).await {
                            warn!(%peer, error = %e, "RPC client error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "RPC accept error"),
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<ToolRouter>,
) -> Result<(), SpotError> {
    let ws = accept_async(stream)
        .await
        .map_err(|e| SpotError::Transport(format!("WS handshake from {peer}: {e}")))?;
    debug!(%peer, "RPC client connected");
    let (mut tx, mut rx) = ws.split();

    while let Some(msg) = rx.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                return Err(SpotError::Transport(format!("WS read from {peer}: {e}")));
            }
        };
        if let Some(reply) = handle_message(&router, text.as_str()) {
            tx.send(Message::Text(reply.into()))
                .await
                .map_err(|e| SpotError::Transport(format!("WS write to {peer}: {e}")))?;
        }
    }

    debug!(%peer, "RPC client disconnected");
    Ok(())
}

// ---------------------------------------------------------------------------
// Message handling
// ---------------------------------------------------------------------------

/// Handle one JSON-RPC text message.  Returns the serialized response, or
/// `None` for notifications (requests without an `id`).
pub fn handle_message(router: &ToolRouter, text: &str) -> Option<String> {
    let response = match serde_json::from_str::<Value>(text) {
        Ok(request) => dispatch(router, request)?,
        Err(e) => error_response(Value::Null, codes::PARSE_ERROR, &format!("parse error: {e}")),
    };
    Some(response.to_string())
}

fn dispatch(router: &ToolRouter, request: Value) -> Option<Value> {
    let id = request.get("id").cloned();
    let is_valid = request.get("jsonrpc").and_then(Value::as_str) == Some("2.0");
    let Some(method) = request.get("method").and_then(Value::as_str).filter(|_| is_valid) else {
        return Some(error_response(
            id.unwrap_or(Value::Null),
            codes::INVALID_REQUEST,
            "expected a JSON-RPC 2.0 request object",
        ));
    };
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let result = match method {
        "tools/list" => Ok(json!({ "tools": router.list() })),
        "tools/call" => call_tool(router, params),
        "ping" => Ok(json!({})),
        other => Err((codes::METHOD_NOT_FOUND, format!("unknown method '{other}'"))),
    };

    // Notifications run but are never answered.
    let id = id?;
    Some(match result {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => error_response(id, code, &message),
    })
}

fn call_tool(router: &ToolRouter, params: Value) -> Result<Value, (i64, String)> {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return Err((codes::INVALID_PARAMS, "tools/call requires params.name".into()));
    };
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
    router
        .call(name, arguments)
        .map_err(|e| (e.rpc_code(), e.to_string()))
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotlink_bridge::MotionLimits;

    fn router() -> ToolRouter {
        let (bridge, _endpoint) = Bridge::new(MotionLimits::default());
        ToolRouter::new(bridge)
    }

    fn reply(router: &ToolRouter, text: &str) -> Value {
        serde_json::from_str(&handle_message(router, text).unwrap()).unwrap()
    }

    #[test]
    fn default_address() {
        let (bridge, _endpoint) = Bridge::new(MotionLimits::default());
        assert_eq!(RpcServer::new(bridge.clone()).port(), DEFAULT_PORT);
        assert_eq!(RpcServer::new(bridge).with_addr("0.0.0.0", 9000).port(), 9000);
    }

    #[test]
    fn tools_list_answers_with_request_id() {
        let r = router();
        let resp = reply(&r, r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#);
        assert_eq!(resp["id"], 7);
        assert_eq!(resp["result"]["tools"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn tools_call_dispatches_to_router() {
        let r = router();
        let resp = reply(
            &r,
            r#"{"jsonrpc":"2.0","id":"a","method":"tools/call",
                "params":{"name":"move","arguments":{"direction":"left","length":0.5}}}"#,
        );
        assert_eq!(resp["id"], "a");
        assert_eq!(resp["result"]["ok"], true);
        assert_eq!(resp["result"]["applied"]["direction"], "left");
    }

    #[test]
    fn error_codes_follow_json_rpc() {
        let r = router();
        assert_eq!(reply(&r, "{not json")["error"]["code"], codes::PARSE_ERROR);
        assert_eq!(
            reply(&r, r#"{"id":1,"method":"tools/list"}"#)["error"]["code"],
            codes::INVALID_REQUEST
        );
        assert_eq!(
            reply(&r, r#"[1,2]"#)["error"]["code"],
            codes::INVALID_REQUEST
        );
        assert_eq!(
            reply(&r, r#"{"jsonrpc":"2.0","id":1,"method":"tools/destroy"}"#)["error"]["code"],
            codes::METHOD_NOT_FOUND
        );
        assert_eq!(
            reply(
                &r,
                r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"warp"}}"#
            )["error"]["code"],
            codes::METHOD_NOT_FOUND
        );
        let invalid = reply(
            &r,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call",
                "params":{"name":"move","arguments":{"direction":"diagonal","length":1}}}"#,
        );
        assert_eq!(invalid["error"]["code"], codes::INVALID_PARAMS);
        assert!(invalid["error"]["message"].as_str().unwrap().contains("diagonal"));
    }

    #[test]
    fn notifications_get_no_reply_but_still_run() {
        let (bridge, mut endpoint) = Bridge::new(MotionLimits::default());
        let r = ToolRouter::new(bridge);
        let out = handle_message(
            &r,
            r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"stop"}}"#,
        );
        assert!(out.is_none());
        assert!(endpoint.commands.take_pending().unwrap().motion.is_stop());
    }
}
