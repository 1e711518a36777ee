//! [`DebugHttpServer`] – plain HTTP endpoints for poking the robot from a
//! browser or `curl`.
//!
//! | Route | Effect |
//! |---|---|
//! | `GET /` | help text |
//! | `GET /state` | latest state as JSON |
//! | `GET /camera` | latest frame as PNG (503 when none) |
//! | `GET /move?direction=<d>&length=<f>[&speed=<f>]` | submit a move |
//! | `GET /stop` | submit a stop |
//!
//! Every response is marked `Cache-Control: no-store` and closes the
//! connection.

use std::fmt::Display;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use spotlink_bridge::Bridge;
use spotlink_types::SpotError;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::tools::{move_ack_json, state_json};

pub const DEFAULT_PORT: u16 = 8001;

const HELP_TEXT: &str = "\
spotlink debug server

Endpoints:
  /state                                   latest state as JSON
  /camera                                  latest camera frame as PNG
  /move?direction=forward&length=1.0       send a move (metres; degrees for turns)
        [&speed=0.5]                       optional speed override
  /stop                                    stop immediately

Directions: forward, backward, left, right, turn_left, turn_right
";

/// Query string of `GET /move`.
#[derive(Debug, Deserialize)]
pub struct MoveQuery {
    pub direction: String,
    pub length: f32,
    #[serde(default)]
    pub speed: Option<f32>,
}

/// The debug routes over `bridge`, ready to serve or to drive in tests.
pub fn router(bridge: Bridge) -> Router {
    Router::new()
        .route("/", get(help))
        .route("/state", get(state))
        .route("/camera", get(camera))
        .route("/move", get(move_robot))
        .route("/stop", get(stop))
        .fallback(not_found)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONNECTION,
            HeaderValue::from_static("close"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(bridge)
}

fn error_json(status: StatusCode, error: impl Display) -> Response {
    (status, Json(json!({ "ok": false, "error": error.to_string() }))).into_response()
}

async fn help() -> &'static str {
    HELP_TEXT
}

async fn state(State(bridge): State<Bridge>) -> Response {
    match state_json(&bridge) {
        Ok(state) => Json(state).into_response(),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn camera(State(bridge): State<Bridge>) -> Response {
    let Some(frame) = bridge.get_camera() else {
        return error_json(StatusCode::SERVICE_UNAVAILABLE, "No camera frame available");
    };
    match frame.encode_png() {
        Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn move_robot(
    State(bridge): State<Bridge>,
    query: Result<Query<MoveQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return error_json(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    match bridge.submit_move_with_speed(&query.direction, query.length, query.speed) {
        Ok(ack) => Json(move_ack_json(&ack)).into_response(),
        Err(e) => error_json(StatusCode::BAD_REQUEST, e),
    }
}

async fn stop(State(bridge): State<Bridge>) -> Json<serde_json::Value> {
    let receipt = bridge.stop();
    Json(json!({ "ok": true, "command_id": receipt.command_id }))
}

async fn not_found() -> Response {
    error_json(StatusCode::NOT_FOUND, "not found")
}

// ---------------------------------------------------------------------------
// DebugHttpServer
// ---------------------------------------------------------------------------

pub struct DebugHttpServer {
    bridge: Bridge,
    host: String,
    port: u16,
}

impl DebugHttpServer {
    pub fn new(bridge: Bridge) -> Self {
        Self {
            bridge,
            host: "127.0.0.1".to_string(),
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

    /// # Errors
    ///
    /// [`SpotError::Transport`] if the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener, SpotError> {
        let addr = format!("{}:{}", self.host, self.port);
        TcpListener::bind(&addr)
            .await
            .map_err(|e| SpotError::Transport(format!("debug HTTP bind error on {addr}: {e}")))
    }

    pub async fn run(self) -> Result<(), SpotError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<(), SpotError> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "debug HTTP server listening on http://{addr}");
        }
        axum::serve(listener, router(self.bridge))
            .await
            .map_err(|e| SpotError::Transport(format!("debug HTTP server stopped: {e}")))
    }
}
