//! [`ToolRouter`] – the tool surface both servers and the agent agree on.
//!
//! Transport-free: `call` takes a tool name and JSON arguments and returns
//! JSON, so the RPC server only frames messages around it and tests can
//! drive it directly.
//!
//! | Tool | Arguments | Result |
//! |---|---|---|
//! | `get_state` | – | latest state plus camera summary |
//! | `get_camera` | – | base64 PNG with width/height, or `ok: false` |
//! | `move` | `direction`, `length`, optional `speed` | submission receipt |
//! | `stop` | – | submission receipt |

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use spotlink_bridge::{Bridge, MoveAck};
use spotlink_types::{CameraFrame, SpotError};
use thiserror::Error;
use tracing::debug;

use crate::rpc::codes;

pub const GET_STATE: &str = "get_state";
pub const GET_CAMERA: &str = "get_camera";
pub const MOVE: &str = "move";
pub const STOP: &str = "stop";

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    /// Arguments did not match the tool's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The bridge refused the request.
    #[error(transparent)]
    Rejected(#[from] SpotError),
}

impl ToolError {
    /// JSON-RPC error code for this failure.
    pub fn rpc_code(&self) -> i64 {
        match self {
            ToolError::UnknownTool(_) => codes::METHOD_NOT_FOUND,
            ToolError::InvalidArguments(_) | ToolError::Rejected(SpotError::Validation(_)) => {
                codes::INVALID_PARAMS
            }
            ToolError::Rejected(_) => codes::INTERNAL_ERROR,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments of the `move` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MoveArgs {
    /// One of forward, backward, left, right, turn_left, turn_right.
    pub direction: String,
    /// Metres for translations, degrees for turns.  Must be positive.
    pub length: f32,
    /// Optional speed override in m/s (rad/s for turns).
    #[serde(default)]
    pub speed: Option<f32>,
}

/// Tools that take no arguments.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// ToolRouter
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ToolRouter {
    bridge: Bridge,
}

impl ToolRouter {
    pub fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }

    pub fn list(&self) -> Vec<ToolDescriptor> {
        let no_args = serde_json::to_value(schema_for!(NoArgs)).unwrap_or(Value::Null);
        vec![
            ToolDescriptor {
                name: GET_STATE,
                description: "Return the most recently published robot state \
                              (pose, velocity, execution status, camera metadata).",
                input_schema: no_args.clone(),
            },
            ToolDescriptor {
                name: GET_CAMERA,
                description: "Return the latest body camera image as a base64-encoded PNG.",
                input_schema: no_args.clone(),
            },
            ToolDescriptor {
                name: MOVE,
                description: "Move the robot: translations take metres, turns take degrees. \
                              Replaces any command not yet started.",
                input_schema: serde_json::to_value(schema_for!(MoveArgs))
                    .unwrap_or(Value::Null),
            },
            ToolDescriptor {
                name: STOP,
                description: "Halt the robot as soon as possible.",
                input_schema: no_args,
            },
        ]
    }

    /// Dispatch one tool call.
    ///
    /// # Errors
    ///
    /// [`ToolError::UnknownTool`] for names not in [`list`][Self::list],
    /// [`ToolError::InvalidArguments`] when `args` do not match the schema,
    /// [`ToolError::Rejected`] when the bridge refuses the command.
    pub fn call(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        debug!(tool = name, "tool call");
        match name {
            GET_STATE => {
                parse_args::<NoArgs>(args)?;
                state_json(&self.bridge)
            }
            GET_CAMERA => {
                parse_args::<NoArgs>(args)?;
                Ok(camera_json(self.bridge.get_camera().as_ref()))
            }
            MOVE => {
                let args: MoveArgs = parse_args(args)?;
                let ack = self
                    .bridge
                    .submit_move_with_speed(&args.direction, args.length, args.speed)?;
                Ok(move_ack_json(&ack))
            }
            STOP => {
                parse_args::<NoArgs>(args)?;
                let receipt = self.bridge.stop();
                Ok(json!({
                    "ok": true,
                    "command_id": receipt.command_id,
                    "replaced": receipt.replaced,
                }))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Receipt for an accepted move, shared by the tool and HTTP surfaces.
pub fn move_ack_json(ack: &MoveAck) -> Value {
    json!({
        "ok": true,
        "command_id": ack.receipt.command_id,
        "replaced": ack.receipt.replaced,
        "held_by_stop": ack.receipt.held_by_stop,
        "applied": {
            "direction": ack.direction,
            "length": ack.length,
            "speed": ack.speed,
        },
    })
}

/// The latest state with the camera summary from the same tick.
pub fn state_json(bridge: &Bridge) -> Result<Value, ToolError> {
    let snap = bridge.snapshot();
    let mut value = serde_json::to_value(&snap.state)
        .map_err(|e| SpotError::Serialization(e.to_string()))?;
    if let Value::Object(map) = &mut value {
        map.insert(
            "orientation_xyzw".into(),
            json!(snap.state.pose.orientation_xyzw()),
        );
        map.insert(
            "camera".into(),
            serde_json::to_value(CameraFrame::summary(snap.frame.as_ref()))
                .map_err(|e| SpotError::Serialization(e.to_string()))?,
        );
    }
    Ok(value)
}

/// `get_camera` result.  A missing or unencodable frame is reported in-band
/// with `ok: false`, not as a call error.
pub fn camera_json(frame: Option<&CameraFrame>) -> Value {
    let Some(frame) = frame else {
        return json!({ "ok": false, "error": "No camera frame available" });
    };
    match frame.encode_png() {
        Ok(png) => json!({
            "ok": true,
            "sequence": frame.sequence,
            "width": frame.width,
            "height": frame.height,
            "mime": "image/png",
            "image_base64": BASE64.encode(png),
        }),
        Err(e) => json!({ "ok": false, "error": e.to_string() }),
    }
}
