//! Generic `LocomotionController` trait for legged (or wheeled) bases driven
//! by a body-frame velocity command.
//!
//! The pretrained walking policy owns gait and balance; the bridge only ever
//! talks to this trait, so a physics-engine backed controller and the
//! kinematic [`SimLocomotion`][crate::sim::SimLocomotion] are interchangeable.

use spotlink_types::{Pose, SpotError, Velocity};

/// Body-frame velocity target, the controller's motion primitive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BaseCommand {
    /// Forward speed, m/s.
    pub vx: f32,
    /// Leftward speed, m/s.
    pub vy: f32,
    /// Counter-clockwise yaw rate, rad/s.
    pub yaw_rate: f32,
}

impl BaseCommand {
    pub const ZERO: BaseCommand = BaseCommand {
        vx: 0.0,
        vy: 0.0,
        yaw_rate: 0.0,
    };

    pub fn new(vx: f32, vy: f32, yaw_rate: f32) -> Self {
        Self { vx, vy, yaw_rate }
    }

    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite() && self.yaw_rate.is_finite()
    }
}

/// A velocity-commanded robot base.
pub trait LocomotionController: Send {
    /// Stable identifier used in actuation fault messages, e.g. `"spot_base"`.
    fn id(&self) -> &str;

    /// Set the velocity target applied by subsequent [`step`][Self::step]s.
    ///
    /// # Errors
    ///
    /// Returns [`SpotError::Actuation`] if the command cannot be accepted
    /// (non-finite values, controller in a fault state).
    fn command(&mut self, cmd: BaseCommand) -> Result<(), SpotError>;

    /// Stop as soon as possible.  Defaults to commanding zero velocity;
    /// controllers that can stand in place immediately should override it.
    fn halt(&mut self) -> Result<(), SpotError> {
        self.command(BaseCommand::ZERO)
    }

    /// Advance the physics by `dt` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`SpotError::Actuation`] when the controller cannot realise
    /// the current command, e.g. the pose became unreachable.
    fn step(&mut self, dt: f32) -> Result<(), SpotError>;

    /// Latest world pose.
    fn pose(&self) -> Pose;

    /// Latest measured body-frame velocity.
    fn velocity(&self) -> Velocity;
}
