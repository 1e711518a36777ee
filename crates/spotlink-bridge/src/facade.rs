//! The Bridge Facade shared by every server and client.
//!
//! [`Bridge`] is an explicitly owned handle: whoever starts the simulation
//! creates it with [`Bridge::new`] and passes clones to the servers at
//! construction time.  It only validates and forwards; all motion logic
//! lives in the executor on the simulation side.

use std::sync::Arc;

use spotlink_types::{CameraFrame, Direction, Motion, RobotState, SpotError};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::channel::{CommandReceiver, CommandSender, SubmitReceipt, command_channel};
use crate::executor::MotionLimits;
use crate::snapshot::{Snapshot, SnapshotReader, SnapshotStore, SnapshotWriter};
use crate::status_bus::{StatusBus, StatusEvent};

/// Acknowledgement of an accepted move.  Acceptance says nothing about
/// execution; poll [`Bridge::get_state`] for that.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveAck {
    pub receipt: SubmitReceipt,
    pub direction: Direction,
    /// As given: metres, or degrees for turns.
    pub length: f32,
    pub motion: Motion,
    /// Effective speed, m/s or rad/s for turns.
    pub speed: f32,
}

/// The simulation side of a bridge, consumed by the tick loop.
pub struct SimEndpoint {
    pub writer: SnapshotWriter,
    pub commands: CommandReceiver,
    pub status: StatusBus,
    pub limits: MotionLimits,
}

struct Inner {
    snapshots: SnapshotReader,
    commands: CommandSender,
    status: StatusBus,
    limits: MotionLimits,
}

/// Cloneable handle onto the snapshot store and the command channel.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl Bridge {
    /// Create a bridge and the endpoint the simulation loop drives.
    pub fn new(limits: MotionLimits) -> (Bridge, SimEndpoint) {
        let (writer, snapshots) = SnapshotStore::new();
        let (commands, receiver) = command_channel();
        let status = StatusBus::default();
        let bridge = Bridge {
            inner: Arc::new(Inner {
                snapshots,
                commands,
                status: status.clone(),
                limits,
            }),
        };
        (
            bridge,
            SimEndpoint {
                writer,
                commands: receiver,
                status,
                limits,
            },
        )
    }

    /// Latest published state, or the unstarted sentinel.
    pub fn get_state(&self) -> RobotState {
        self.inner.snapshots.state()
    }

    /// Frame captured with the latest published state, if any.
    pub fn get_camera(&self) -> Option<CameraFrame> {
        self.inner.snapshots.frame()
    }

    /// State and frame from one tick.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshots.read()
    }

    /// Submit a move at the default speed for its kind.
    ///
    /// # Errors
    ///
    /// [`SpotError::Validation`] for an unknown direction or a length that
    /// is not a positive finite number.  Nothing is submitted on error.
    pub fn submit_move(&self, direction: &str, length: f32) -> Result<MoveAck, SpotError> {
        self.submit_move_with_speed(direction, length, None)
    }

    /// Like [`submit_move`][Self::submit_move] with an optional speed
    /// override (m/s, or rad/s for turns), bounded by [`MotionLimits`].
    pub fn submit_move_with_speed(
        &self,
        direction: &str,
        length: f32,
        speed: Option<f32>,
    ) -> Result<MoveAck, SpotError> {
        let direction: Direction = direction.parse()?;
        if !(length.is_finite() && length > 0.0) {
            return Err(SpotError::Validation(format!(
                "length must be a positive number, got {length}"
            )));
        }
        let motion = direction.to_motion(length);
        let limits = &self.inner.limits;
        if let Some(s) = speed {
            let cap = limits.cap(&motion);
            if !(s.is_finite() && s > 0.0 && s <= cap) {
                return Err(SpotError::Validation(format!(
                    "speed must be in (0, {cap}] for {direction}, got {s}"
                )));
            }
        }

        let receipt = self.inner.commands.submit(motion, speed);
        info!(
            command_id = %receipt.command_id,
            %direction,
            length,
            held_by_stop = receipt.held_by_stop,
            "move submitted"
        );
        Ok(MoveAck {
            receipt,
            direction,
            length,
            motion,
            speed: speed.unwrap_or_else(|| limits.default_speed(&motion)),
        })
    }

    /// Halt whatever is running.  Always accepted; a pending stop cannot be
    /// displaced by later moves until the tick consumes it.
    pub fn stop(&self) -> SubmitReceipt {
        let receipt = self.inner.commands.submit(Motion::Stop, None);
        info!(command_id = %receipt.command_id, "stop submitted");
        receipt
    }

    /// Subscribe to status transitions.  Optional; polling works without it.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        debug!("status subscriber added");
        self.inner.status.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_move_reaches_the_channel() {
        let (bridge, mut sim) = Bridge::new(MotionLimits::default());
        let ack = bridge.submit_move("forward", 1.0).unwrap();
        assert_eq!(ack.motion, Motion::Forward(1.0));
        assert_eq!(ack.speed, 0.5);
        let cmd = sim.commands.take_pending().unwrap();
        assert_eq!(cmd.id, ack.receipt.command_id);
        assert_eq!(cmd.speed, None);
    }

    #[test]
    fn turns_take_degrees() {
        let (bridge, mut sim) = Bridge::new(MotionLimits::default());
        bridge.submit_move("turn_left", 90.0).unwrap();
        match sim.commands.take_pending().unwrap().motion {
            Motion::Turn(rad) => assert!((rad - std::f32::consts::FRAC_PI_2).abs() < 1e-6),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_direction_never_reaches_the_channel() {
        let (bridge, mut sim) = Bridge::new(MotionLimits::default());
        let err = bridge.submit_move("upward", 1.0).unwrap_err();
        assert!(matches!(err, SpotError::Validation(_)));
        assert!(sim.commands.take_pending().is_none());
    }

    #[test]
    fn rejects_non_positive_and_non_finite_lengths() {
        let (bridge, mut sim) = Bridge::new(MotionLimits::default());
        for bad in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(
                matches!(bridge.submit_move("forward", bad), Err(SpotError::Validation(_))),
                "length {bad} accepted"
            );
        }
        assert!(sim.commands.take_pending().is_none());
    }

    #[test]
    fn speed_override_is_bounded_by_limits() {
        let (bridge, mut sim) = Bridge::new(MotionLimits::default());
        assert!(bridge.submit_move_with_speed("forward", 1.0, Some(5.0)).is_err());
        assert!(bridge.submit_move_with_speed("forward", 1.0, Some(0.0)).is_err());
        assert!(sim.commands.take_pending().is_none());

        let ack = bridge
            .submit_move_with_speed("right", 0.5, Some(1.0))
            .unwrap();
        assert_eq!(ack.speed, 1.0);
        assert_eq!(sim.commands.take_pending().unwrap().speed, Some(1.0));
    }

    #[test]
    fn stop_holds_against_later_moves() {
        let (bridge, mut sim) = Bridge::new(MotionLimits::default());
        let stop = bridge.stop();
        let ack = bridge.submit_move("forward", 1.0).unwrap();
        assert!(ack.receipt.held_by_stop);
        assert_eq!(sim.commands.take_pending().unwrap().id, stop.command_id);
    }

    #[test]
    fn reads_unstarted_before_simulation_publishes() {
        let (bridge, _sim) = Bridge::new(MotionLimits::default());
        assert!(bridge.get_state().is_unstarted());
        assert!(bridge.get_camera().is_none());
    }
}
