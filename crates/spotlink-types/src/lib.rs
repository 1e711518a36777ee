use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::ImageEncoder;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier handed out by the command channel for every accepted submission.
///
/// Ids increase monotonically for the lifetime of the process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

/// Movement directions accepted by the external surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    TurnLeft,
    TurnRight,
}

impl Direction {
    /// Every direction, in the order the help texts list them.
    pub const ALL: [Direction; 6] = [
        Direction::Forward,
        Direction::Backward,
        Direction::Left,
        Direction::Right,
        Direction::TurnLeft,
        Direction::TurnRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::TurnLeft => "turn_left",
            Direction::TurnRight => "turn_right",
        }
    }

    /// `true` for the two in-place rotations.
    pub fn is_turn(&self) -> bool {
        matches!(self, Direction::TurnLeft | Direction::TurnRight)
    }

    /// Resolve a direction and its `length` into a [`Motion`].
    ///
    /// `length` is metres for translations and degrees for turns.  Sign
    /// conventions follow the body frame: +x forward, +y left, +yaw
    /// counter-clockwise.
    pub fn to_motion(self, length: f32) -> Motion {
        match self {
            Direction::Forward => Motion::Forward(length),
            Direction::Backward => Motion::Forward(-length),
            Direction::Left => Motion::Strafe(length),
            Direction::Right => Motion::Strafe(-length),
            Direction::TurnLeft => Motion::Turn(length.to_radians()),
            Direction::TurnRight => Motion::Turn(-length.to_radians()),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = SpotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" | "fwd" | "front" => Ok(Direction::Forward),
            "backward" | "back" | "reverse" => Ok(Direction::Backward),
            "left" | "strafe_left" => Ok(Direction::Left),
            "right" | "strafe_right" => Ok(Direction::Right),
            "turn_left" | "yaw_left" | "rotate_left" => Ok(Direction::TurnLeft),
            "turn_right" | "yaw_right" | "rotate_right" => Ok(Direction::TurnRight),
            other => Err(SpotError::Validation(format!(
                "unknown direction '{other}'; use one of: \
                 forward/backward/left/right/turn_left/turn_right"
            ))),
        }
    }
}

/// A motion intent as understood by the command executor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum Motion {
    /// Walk along the body x axis, metres.  Negative walks backwards.
    Forward(f32),
    /// Side-step along the body y axis, metres.  Positive is to the left.
    Strafe(f32),
    /// Rotate in place, radians.  Positive is counter-clockwise.
    Turn(f32),
    /// Halt whatever is running.
    Stop,
}

impl Motion {
    pub fn is_stop(&self) -> bool {
        matches!(self, Motion::Stop)
    }

    /// Absolute amount still to travel (metres or radians); zero for `Stop`.
    pub fn magnitude(&self) -> f32 {
        match self {
            Motion::Forward(d) | Motion::Strafe(d) | Motion::Turn(d) => d.abs(),
            Motion::Stop => 0.0,
        }
    }
}

/// A submitted motion intent.  Created on submission, consumed by the
/// executor (or replaced by preemption).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveCommand {
    pub id: CommandId,
    pub motion: Motion,
    /// Optional override of the configured walk speed / yaw rate.
    pub speed: Option<f32>,
    pub submitted_at: DateTime<Utc>,
}

/// Robot base pose in the world frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Pose {
    /// World position in metres.
    pub position: [f32; 3],
    /// Heading about +z in radians.
    pub yaw_rad: f32,
}

impl Pose {
    pub fn new(position: [f32; 3], yaw_rad: f32) -> Self {
        Self { position, yaw_rad }
    }

    /// Yaw-only orientation as an `[x, y, z, w]` quaternion.
    pub fn orientation_xyzw(&self) -> [f32; 4] {
        let half = self.yaw_rad * 0.5;
        [0.0, 0.0, half.sin(), half.cos()]
    }
}

/// Body-frame base velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Velocity {
    /// Forward speed, m/s.
    pub vx: f32,
    /// Leftward speed, m/s.
    pub vy: f32,
    /// Counter-clockwise yaw rate, rad/s.
    pub yaw_rate: f32,
}

/// Execution status carried by every published [`RobotState`].
///
/// `Completed`, `Interrupted` and `Failed` are visible for exactly one
/// snapshot before the executor falls back to `Idle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Nothing has been published yet.
    Unstarted,
    Idle,
    Executing {
        command_id: CommandId,
        motion: Motion,
        /// Fraction of the motion already commanded, `0.0..=1.0`.
        progress: f32,
    },
    Completed {
        command_id: CommandId,
    },
    Interrupted {
        command_id: CommandId,
        superseded_by: CommandId,
    },
    Failed {
        command_id: CommandId,
        reason: String,
    },
}

impl ExecutionStatus {
    /// The command this status refers to, if any.
    pub fn command_id(&self) -> Option<CommandId> {
        match self {
            ExecutionStatus::Unstarted | ExecutionStatus::Idle => None,
            ExecutionStatus::Executing { command_id, .. }
            | ExecutionStatus::Completed { command_id }
            | ExecutionStatus::Interrupted { command_id, .. }
            | ExecutionStatus::Failed { command_id, .. } => Some(*command_id),
        }
    }

    /// `true` for the one-tick bookkeeping states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed { .. }
                | ExecutionStatus::Interrupted { .. }
                | ExecutionStatus::Failed { .. }
        )
    }
}

/// Immutable robot state published once per simulation tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    /// Strictly increasing per published snapshot; `0` before the first tick.
    pub sequence: u64,
    /// Simulation clock, seconds since the loop started.
    pub sim_time_s: f64,
    /// Wall-clock time of publication.
    pub timestamp: DateTime<Utc>,
    pub pose: Pose,
    pub velocity: Option<Velocity>,
    /// Velocity the executor is currently asking the base for; zero while
    /// standing.
    pub base_command: Velocity,
    pub status: ExecutionStatus,
}

impl RobotState {
    /// The sentinel returned before the simulation has published anything.
    pub fn unstarted() -> Self {
        Self {
            sequence: 0,
            sim_time_s: 0.0,
            timestamp: Utc::now(),
            pose: Pose::default(),
            velocity: None,
            base_command: Velocity::default(),
            status: ExecutionStatus::Unstarted,
        }
    }

    pub fn is_unstarted(&self) -> bool {
        self.sequence == 0
    }
}

/// Pixel layout of a [`CameraFrame`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageEncoding {
    /// Tightly packed 8-bit RGBA rows.
    Rgba8,
}

/// A camera image paired with the state it was captured with.
///
/// `data` is reference counted and never written after construction, so
/// clones handed to readers cannot observe the next tick's image.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraFrame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub encoding: ImageEncoding,
    pub data: Bytes,
}

impl CameraFrame {
    /// Encode the frame as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`SpotError::Serialization`] if the RGBA buffer does not match
    /// `width * height * 4` or the encoder fails.
    pub fn encode_png(&self) -> Result<Vec<u8>, SpotError> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.data.len() != expected {
            return Err(SpotError::Serialization(format!(
                "RGBA buffer holds {} bytes, expected {expected} for {}x{}",
                self.data.len(),
                self.width,
                self.height
            )));
        }
        let mut png = Vec::with_capacity(expected / 4);
        image::codecs::png::PngEncoder::new(&mut png)
            .write_image(&self.data, self.width, self.height, image::ColorType::Rgba8)
            .map_err(|e| SpotError::Serialization(format!("PNG encoding failed: {e}")))?;
        Ok(png)
    }

    pub fn summary(frame: Option<&CameraFrame>) -> CameraSummary {
        match frame {
            Some(f) => CameraSummary {
                has_frame: true,
                sequence: Some(f.sequence),
                width: f.width,
                height: f.height,
            },
            None => CameraSummary::default(),
        }
    }
}

/// Camera metadata embedded in state responses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraSummary {
    pub has_frame: bool,
    pub sequence: Option<u64>,
    pub width: u32,
    pub height: u32,
}

/// Error taxonomy shared by every spotlink crate.
///
/// Stale reads are not an error: callers detect them by comparing
/// [`RobotState::sequence`] across reads.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpotError {
    /// Malformed command parameters, rejected before reaching the executor.
    #[error("Validation Error: {0}")]
    Validation(String),

    /// The robot controller could not execute a motion.
    #[error("Actuation Error on {component}: {details}")]
    Actuation { component: String, details: String },

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}
