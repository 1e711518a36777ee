//! The simulation tick loop: the bridge's only writer.
//!
//! Each tick drains the command channel, lets the executor advance the
//! controller through the physics substeps, captures the camera and
//! publishes the state/frame pair.  The loop runs on its own OS thread and
//! never fails because of a command: per-command errors end up in the
//! published status and camera errors in a frameless snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use spotlink_hal::{BaseCommand, Camera, LocomotionController, RawImage};
use spotlink_types::{
    CameraFrame, ExecutionStatus, ImageEncoding, RobotState, SpotError, Velocity,
};
use tracing::{debug, info, warn};

use crate::executor::CommandExecutor;
use crate::facade::SimEndpoint;
use crate::status_bus::StatusEvent;

/// Tick loop timing.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Ticks per second when running in real time.  Defaults to the 50 Hz
    /// render rate.
    pub tick_hz: f64,
    /// Physics steps per tick.
    pub physics_substeps: u32,
    /// Length of one physics step, seconds.
    pub physics_dt: f32,
    /// Sleep to hold `tick_hz`; `false` runs as fast as possible.
    pub realtime: bool,
    /// Stop after this many ticks (`None` runs until shutdown).
    pub max_ticks: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_hz: 50.0,
            physics_substeps: 10,
            physics_dt: 1.0 / 500.0,
            realtime: true,
            max_ticks: None,
        }
    }
}

impl LoopConfig {
    /// Unpaced configuration for tests and batch runs.
    pub fn fast() -> Self {
        Self {
            realtime: false,
            ..Self::default()
        }
    }

    /// Simulated seconds covered by one tick.
    pub fn tick_dt(&self) -> f64 {
        self.physics_substeps as f64 * self.physics_dt as f64
    }

    /// Wall-clock length of one tick at `tick_hz`.
    ///
    /// # Errors
    ///
    /// [`SpotError::Config`] when `tick_hz` is not positive or so small that
    /// the period does not fit in a [`Duration`].
    pub fn period(&self) -> Result<Duration, SpotError> {
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0) {
            return Err(SpotError::Config(format!(
                "tick_hz must be > 0, got {}",
                self.tick_hz
            )));
        }
        Duration::try_from_secs_f64(1.0 / self.tick_hz).map_err(|e| {
            SpotError::Config(format!("tick_hz {} gives no usable period: {e}", self.tick_hz))
        })
    }

    fn validate(&self) -> Result<Duration, SpotError> {
        let period = self.period()?;
        if self.physics_substeps == 0 {
            return Err(SpotError::Config("physics_substeps must be >= 1".into()));
        }
        if !(self.physics_dt.is_finite() && self.physics_dt > 0.0) {
            return Err(SpotError::Config(format!(
                "physics_dt must be > 0, got {}",
                self.physics_dt
            )));
        }
        if self.tick_hz > 1000.0 {
            warn!(tick_hz = self.tick_hz, "very high tick rate requested");
        }
        Ok(period)
    }
}

/// Owns the simulation side of a [`Bridge`][crate::Bridge].
pub struct SimulationLoop {
    config: LoopConfig,
    period: Duration,
    endpoint: SimEndpoint,
    executor: CommandExecutor,
    base: Box<dyn LocomotionController>,
    camera: Box<dyn Camera>,
    sim_time_s: f64,
    last_status: ExecutionStatus,
    camera_healthy: bool,
    shutdown: Arc<AtomicBool>,
}

impl SimulationLoop {
    /// # Errors
    ///
    /// [`SpotError::Config`] when the timing parameters are unusable.
    pub fn new(
        config: LoopConfig,
        endpoint: SimEndpoint,
        base: Box<dyn LocomotionController>,
        camera: Box<dyn Camera>,
    ) -> Result<Self, SpotError> {
        let period = config.validate()?;
        let executor = CommandExecutor::new(endpoint.limits);
        Ok(Self {
            config,
            period,
            endpoint,
            executor,
            base,
            camera,
            sim_time_s: 0.0,
            last_status: ExecutionStatus::Unstarted,
            camera_healthy: true,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that ends [`run`][Self::run] after the current tick.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run a single tick and return the published sequence number.
    pub fn tick(&mut self) -> u64 {
        let incoming = self.endpoint.commands.take_pending();
        let status = self.executor.tick(
            incoming,
            self.base.as_mut(),
            self.config.physics_substeps,
            self.config.physics_dt,
        );
        self.sim_time_s += self.config.tick_dt();

        let pose = self.base.pose();
        let frame = match self.camera.capture(&pose).and_then(to_frame) {
            Ok(frame) => {
                if !self.camera_healthy {
                    info!(camera = self.camera.id(), "camera frames restored");
                    self.camera_healthy = true;
                }
                Some(frame)
            }
            Err(e) => {
                if self.camera_healthy {
                    warn!(camera = self.camera.id(), error = %e, "camera capture failed; publishing without frame");
                    self.camera_healthy = false;
                }
                None
            }
        };

        let state = RobotState {
            sequence: 0,
            sim_time_s: self.sim_time_s,
            timestamp: Utc::now(),
            pose,
            velocity: Some(self.base.velocity()),
            base_command: velocity_of(self.executor.commanded()),
            status: status.clone(),
        };
        let seq = self.endpoint.writer.publish(state, frame);

        if !same_phase(&status, &self.last_status) {
            debug!(seq, status = ?status, "status changed");
            self.endpoint.status.publish(StatusEvent {
                sequence: seq,
                status: status.clone(),
            });
        }
        self.last_status = status;
        seq
    }

    /// Tick until shutdown or `max_ticks`.  Returns the number of ticks run.
    pub fn run(mut self) -> u64 {
        let period = self.period;
        let mut next_deadline = Instant::now() + period;
        let mut ticks = 0u64;
        info!(
            tick_hz = self.config.tick_hz,
            substeps = self.config.physics_substeps,
            realtime = self.config.realtime,
            "simulation loop started"
        );

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            if let Some(max) = self.config.max_ticks
                && ticks >= max
            {
                break;
            }

            self.tick();
            ticks += 1;

            if self.config.realtime {
                let now = Instant::now();
                if next_deadline > now {
                    std::thread::sleep(next_deadline - now);
                    next_deadline += period;
                } else {
                    // Overran: resync instead of bursting to catch up.
                    debug!(behind_ms = (now - next_deadline).as_millis() as u64, "tick overran");
                    next_deadline = now + period;
                }
            }
        }

        if let Err(e) = self.base.halt() {
            warn!(error = %e, "halt on shutdown failed");
        }
        info!(ticks, sim_time_s = self.sim_time_s, "simulation loop stopped");
        ticks
    }

    /// Run the loop on a dedicated, named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<u64>> {
        std::thread::Builder::new()
            .name("sim-tick".into())
            .spawn(move || self.run())
    }
}

fn to_frame(raw: RawImage) -> Result<CameraFrame, SpotError> {
    let expected = raw.width as usize * raw.height as usize * 4;
    if raw.rgba.len() != expected {
        return Err(SpotError::Serialization(format!(
            "camera returned {} bytes for {}x{} RGBA",
            raw.rgba.len(),
            raw.width,
            raw.height
        )));
    }
    Ok(CameraFrame {
        sequence: 0,
        width: raw.width,
        height: raw.height,
        encoding: ImageEncoding::Rgba8,
        data: Bytes::from(raw.rgba),
    })
}

fn velocity_of(cmd: BaseCommand) -> Velocity {
    Velocity {
        vx: cmd.vx,
        vy: cmd.vy,
        yaw_rate: cmd.yaw_rate,
    }
}

/// Same variant for the same command; progress updates do not count.
fn same_phase(a: &ExecutionStatus, b: &ExecutionStatus) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b) && a.command_id() == b.command_id()
}
