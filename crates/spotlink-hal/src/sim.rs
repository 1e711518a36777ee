//! In-process kinematic robot for headless runs and tests.
//!
//! [`SimRobot`] bundles a [`SimLocomotion`] base and a [`SimCamera`] so the
//! whole bridge can run without a physics engine.  The base model keeps to
//! first-order velocity tracking, planar integration
//! at a fixed standing height, and an optional heading drift proportional to
//! distance walked (the pretrained policy's yaw drift is an external
//! limitation that callers must live with).
//!
//! # Example
//!
//! ```rust
//! use spotlink_hal::sim::SimRobot;
//! use spotlink_hal::{BaseCommand, LocomotionController};
//!
//! let mut robot = SimRobot::builder().spawn_at([0.0, 0.0, 0.8]).build();
//! robot.locomotion.command(BaseCommand::new(0.5, 0.0, 0.0)).unwrap();
//! robot.locomotion.step(1.0).unwrap();
//! assert!(robot.locomotion.pose().position[0] > 0.0);
//! ```

use std::f32::consts::{PI, TAU};

use spotlink_types::{Pose, SpotError, Velocity};

use crate::camera::{Camera, RawImage};
use crate::locomotion::{BaseCommand, LocomotionController};

// ────────────────────────────────────────────────────────────────────────────
// Simulated base
// ────────────────────────────────────────────────────────────────────────────

/// Kinematic legged base.
pub struct SimLocomotion {
    id: String,
    pose: Pose,
    velocity: Velocity,
    target: BaseCommand,
    /// Velocity tracking time constant in seconds; `0` tracks instantly.
    tau_s: f32,
    /// Extra yaw in radians accumulated per metre walked.
    yaw_drift_per_m: f32,
    /// Radius around the spawn point the base may not leave.
    arena_radius: Option<f32>,
    spawn: [f32; 3],
}

impl SimLocomotion {
    pub fn new(id: impl Into<String>, spawn: [f32; 3]) -> Self {
        Self {
            id: id.into(),
            pose: Pose::new(spawn, 0.0),
            velocity: Velocity::default(),
            target: BaseCommand::ZERO,
            tau_s: 0.0,
            yaw_drift_per_m: 0.0,
            arena_radius: None,
            spawn,
        }
    }

    fn fault(&self, details: impl Into<String>) -> SpotError {
        SpotError::Actuation {
            component: self.id.clone(),
            details: details.into(),
        }
    }
}

impl LocomotionController for SimLocomotion {
    fn id(&self) -> &str {
        &self.id
    }

    fn command(&mut self, cmd: BaseCommand) -> Result<(), SpotError> {
        if !cmd.is_finite() {
            return Err(self.fault(format!("non-finite base command {cmd:?}")));
        }
        self.target = cmd;
        Ok(())
    }

    /// Stand in place: the target and the measured velocity both drop to
    /// zero, so the pose is frozen from the next step on.
    fn halt(&mut self) -> Result<(), SpotError> {
        self.target = BaseCommand::ZERO;
        self.velocity = Velocity::default();
        Ok(())
    }

    fn step(&mut self, dt: f32) -> Result<(), SpotError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(self.fault(format!("invalid physics step {dt}")));
        }

        let alpha = if self.tau_s > 0.0 {
            1.0 - (-dt / self.tau_s).exp()
        } else {
            1.0
        };
        self.velocity.vx += alpha * (self.target.vx - self.velocity.vx);
        self.velocity.vy += alpha * (self.target.vy - self.velocity.vy);
        self.velocity.yaw_rate += alpha * (self.target.yaw_rate - self.velocity.yaw_rate);

        let (sin, cos) = self.pose.yaw_rad.sin_cos();
        let dx = (self.velocity.vx * cos - self.velocity.vy * sin) * dt;
        let dy = (self.velocity.vx * sin + self.velocity.vy * cos) * dt;
        let walked = (dx * dx + dy * dy).sqrt();

        self.pose.position[0] += dx;
        self.pose.position[1] += dy;
        self.pose.yaw_rad = wrap_angle(
            self.pose.yaw_rad + self.velocity.yaw_rate * dt + self.yaw_drift_per_m * walked,
        );

        if let Some(radius) = self.arena_radius {
            let ox = self.pose.position[0] - self.spawn[0];
            let oy = self.pose.position[1] - self.spawn[1];
            let dist = (ox * ox + oy * oy).sqrt();
            if dist > radius {
                // Put the base back just inside the boundary and stand.
                let scale = radius / dist * (1.0 - 1e-6);
                self.pose.position[0] = self.spawn[0] + ox * scale;
                self.pose.position[1] = self.spawn[1] + oy * scale;
                self.halt()?;
                return Err(self.fault(format!(
                    "pose unreachable: {dist:.2} m from spawn exceeds arena radius {radius:.2} m"
                )));
            }
        }
        Ok(())
    }

    fn pose(&self) -> Pose {
        self.pose
    }

    fn velocity(&self) -> Velocity {
        self.velocity
    }
}

/// Wrap an angle into `(-PI, PI]`.
fn wrap_angle(a: f32) -> f32 {
    if a > -PI && a <= PI {
        return a;
    }
    let mut w = (a + PI).rem_euclid(TAU) - PI;
    if w <= -PI {
        w += TAU;
    }
    w
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated camera
// ────────────────────────────────────────────────────────────────────────────

/// Renders a sky over a checkered floor as seen from the body pose, so
/// consecutive frames change as the robot walks and turns.
pub struct SimCamera {
    id: String,
    width: u32,
    height: u32,
    /// Horizontal field of view, radians.
    hfov: f32,
    /// Lens height above the floor, metres.
    mount_height: f32,
}

impl SimCamera {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            hfov: 90f32.to_radians(),
            mount_height: 0.8,
        }
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self, body_pose: &Pose) -> Result<RawImage, SpotError> {
        if self.width == 0 || self.height == 0 {
            return Err(SpotError::Actuation {
                component: self.id.clone(),
                details: "camera resolution is zero".to_string(),
            });
        }

        let (w, h) = (self.width as usize, self.height as usize);
        let horizon = h / 2;
        let vfov = self.hfov * h as f32 / w as f32;
        let mut rgba = vec![0u8; w * h * 4];

        // Per-column bearing in the world frame.
        let bearings: Vec<(f32, f32)> = (0..w)
            .map(|x| {
                let offset = self.hfov * (0.5 - (x as f32 + 0.5) / w as f32);
                (body_pose.yaw_rad + offset).sin_cos()
            })
            .collect();

        for y in 0..h {
            let row = &mut rgba[y * w * 4..(y + 1) * w * 4];
            if y < horizon {
                let t = y as f32 / horizon.max(1) as f32;
                let sky = [(110.0 + 80.0 * t) as u8, (160.0 + 60.0 * t) as u8, 235, 255];
                for px in row.chunks_exact_mut(4) {
                    px.copy_from_slice(&sky);
                }
                continue;
            }

            let below = vfov * ((y - horizon) as f32 + 0.5) / h as f32;
            let distance = self.mount_height / below.tan().max(1e-3);
            let shade = (1.0 / (1.0 + 0.15 * distance)).clamp(0.25, 1.0);
            for (px, (sin, cos)) in row.chunks_exact_mut(4).zip(&bearings) {
                let gx = body_pose.position[0] + distance * cos;
                let gy = body_pose.position[1] + distance * sin;
                let light = (gx.floor() as i64 + gy.floor() as i64).rem_euclid(2) == 0;
                let base = if light { 200.0 } else { 90.0 };
                let v = (base * shade) as u8;
                px.copy_from_slice(&[v, v, v, 255]);
            }
        }

        Ok(RawImage {
            width: self.width,
            height: self.height,
            rgba,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRobot builder
// ────────────────────────────────────────────────────────────────────────────

/// A simulated base and its body camera.
pub struct SimRobot {
    pub locomotion: SimLocomotion,
    pub camera: SimCamera,
}

impl SimRobot {
    pub fn builder() -> SimRobotBuilder {
        SimRobotBuilder::default()
    }
}

/// Builder for [`SimRobot`].  Defaults match the reference scene: spawn at
/// `[0, 0, 0.8]`, 512×256 camera, ideal velocity tracking, no drift.
pub struct SimRobotBuilder {
    spawn: [f32; 3],
    camera_resolution: (u32, u32),
    tau_s: f32,
    yaw_drift_per_m: f32,
    arena_radius: Option<f32>,
}

impl Default for SimRobotBuilder {
    fn default() -> Self {
        Self {
            spawn: [0.0, 0.0, 0.8],
            camera_resolution: (512, 256),
            tau_s: 0.0,
            yaw_drift_per_m: 0.0,
            arena_radius: None,
        }
    }
}

impl SimRobotBuilder {
    pub fn spawn_at(mut self, position: [f32; 3]) -> Self {
        self.spawn = position;
        self
    }

    pub fn camera_resolution(mut self, width: u32, height: u32) -> Self {
        self.camera_resolution = (width, height);
        self
    }

    /// First-order velocity tracking time constant, seconds.
    pub fn velocity_lag(mut self, tau_s: f32) -> Self {
        self.tau_s = tau_s.max(0.0);
        self
    }

    /// Heading drift in radians per metre walked.
    pub fn yaw_drift(mut self, rad_per_m: f32) -> Self {
        self.yaw_drift_per_m = rad_per_m;
        self
    }

    /// Fault the base when it walks further than `radius` from its spawn.
    pub fn arena_radius(mut self, radius: f32) -> Self {
        self.arena_radius = Some(radius);
        self
    }

    pub fn build(self) -> SimRobot {
        let mut locomotion = SimLocomotion::new("spot_base", self.spawn);
        locomotion.tau_s = self.tau_s;
        locomotion.yaw_drift_per_m = self.yaw_drift_per_m;
        locomotion.arena_radius = self.arena_radius;
        let (w, h) = self.camera_resolution;
        let mut camera = SimCamera::new("body_rgb", w, h);
        camera.mount_height = self.spawn[2].max(0.1);
        SimRobot { locomotion, camera }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
