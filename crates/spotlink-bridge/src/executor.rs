//! Command Executor: the per-tick motion state machine.
//!
//! ```text
//! Idle ──take──▶ Executing ──done──▶ Completed ─┐
//!                    │  ├──fault──▶ Failed ─────┤──(one tick)──▶ Idle
//!                    │  └──newer──▶ Interrupted ┘
//!                    └──stop────▶ Completed
//! ```
//!
//! Motions are tracked open loop: progress is the commanded speed times the
//! simulated time it was applied, and the last substep's speed is trimmed so
//! the commanded distance or angle is met exactly.  Heading error from the
//! walking controller is not corrected and carries into the next command.
//!
//! Preemption takes two ticks: the tick that sees the newcomer halts the
//! base and reports `Interrupted`; the newcomer starts on the following tick.
//! `Stop` is the exception and halts and completes within its own tick.

use spotlink_hal::{BaseCommand, LocomotionController};
use spotlink_types::{CommandId, ExecutionStatus, Motion, MoveCommand};
use tracing::{debug, info, warn};

/// Remaining amount below which a motion counts as done.
const DONE_EPSILON: f32 = 1e-6;

/// Default and maximum speeds for each kind of motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionLimits {
    /// Forward/backward walking speed, m/s.
    pub walk_speed: f32,
    /// Side-step speed, m/s.
    pub strafe_speed: f32,
    /// In-place turning rate, rad/s.
    pub yaw_rate: f32,
    /// Upper bound for translational speed overrides, m/s.
    pub max_speed: f32,
    /// Upper bound for turning rate overrides, rad/s.
    pub max_yaw_rate: f32,
}

impl Default for MotionLimits {
    fn default() -> Self {
        Self {
            walk_speed: 0.5,
            strafe_speed: 0.5,
            yaw_rate: 0.8,
            max_speed: 1.5,
            max_yaw_rate: 2.0,
        }
    }
}

impl MotionLimits {
    /// Speed used when a command carries no override.
    pub fn default_speed(&self, motion: &Motion) -> f32 {
        match motion {
            Motion::Forward(_) => self.walk_speed,
            Motion::Strafe(_) => self.strafe_speed,
            Motion::Turn(_) => self.yaw_rate,
            Motion::Stop => 0.0,
        }
    }

    /// Largest speed override accepted for `motion`.
    pub fn cap(&self, motion: &Motion) -> f32 {
        match motion {
            Motion::Forward(_) | Motion::Strafe(_) => self.max_speed,
            Motion::Turn(_) => self.max_yaw_rate,
            Motion::Stop => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Active {
    id: CommandId,
    motion: Motion,
    speed: f32,
    total: f32,
    remaining: f32,
}

impl Active {
    fn progress(&self) -> f32 {
        if self.total <= 0.0 {
            1.0
        } else {
            (1.0 - self.remaining / self.total).clamp(0.0, 1.0)
        }
    }

    /// Velocity for one substep of `dt`, trimmed so it never overshoots.
    fn base_command(&self, dt: f32) -> (BaseCommand, f32) {
        let speed = self.speed.min(self.remaining / dt);
        let cmd = match self.motion {
            Motion::Forward(d) => BaseCommand::new(speed.copysign(d), 0.0, 0.0),
            Motion::Strafe(d) => BaseCommand::new(0.0, speed.copysign(d), 0.0),
            Motion::Turn(a) => BaseCommand::new(0.0, 0.0, speed.copysign(a)),
            Motion::Stop => BaseCommand::ZERO,
        };
        (cmd, speed * dt)
    }
}

/// Drives a [`LocomotionController`] from the commands drained each tick.
pub struct CommandExecutor {
    limits: MotionLimits,
    active: Option<Active>,
    /// Newcomer waiting out its predecessor's `Interrupted` tick.
    deferred: Option<MoveCommand>,
    /// Terminal status to publish for the current tick.
    report: Option<ExecutionStatus>,
    /// Last velocity handed to the base for the active motion.
    commanded: BaseCommand,
}

impl CommandExecutor {
    pub fn new(limits: MotionLimits) -> Self {
        Self {
            limits,
            active: None,
            deferred: None,
            report: None,
            commanded: BaseCommand::ZERO,
        }
    }

    /// Velocity currently asked of the base.  Zero whenever no motion is
    /// active, since every path that ends a motion halts the base.
    pub fn commanded(&self) -> BaseCommand {
        if self.active.is_some() {
            self.commanded
        } else {
            BaseCommand::ZERO
        }
    }

    /// `true` while a motion is in progress or waiting to start.
    pub fn is_busy(&self) -> bool {
        self.active.is_some() || self.deferred.is_some()
    }

    /// Run one tick: apply `incoming`, then advance the controller by
    /// `substeps` physics steps of `dt` seconds.  Returns the status to
    /// publish for this tick.
    ///
    /// Controller errors never escape: they are recorded as `Failed` for the
    /// command that was running, or logged when the base was idle.
    pub fn tick(
        &mut self,
        incoming: Option<MoveCommand>,
        base: &mut dyn LocomotionController,
        substeps: u32,
        dt: f32,
    ) -> ExecutionStatus {
        self.report = None;

        match incoming {
            Some(cmd) if cmd.motion.is_stop() => self.stop(cmd.id, base),
            Some(cmd) => {
                if let Some(current) = self.active.take() {
                    self.halt(base);
                    info!(
                        command_id = %current.id,
                        superseded_by = %cmd.id,
                        "motion interrupted"
                    );
                    self.report = Some(ExecutionStatus::Interrupted {
                        command_id: current.id,
                        superseded_by: cmd.id,
                    });
                    self.deferred = Some(cmd);
                } else {
                    if let Some(dropped) = self.deferred.take() {
                        debug!(command_id = %dropped.id, "deferred command overwritten before start");
                    }
                    self.start(cmd);
                }
            }
            None => {
                if let Some(cmd) = self.deferred.take() {
                    self.start(cmd);
                }
            }
        }

        for _ in 0..substeps {
            self.substep(base, dt);
        }

        self.status()
    }

    fn status(&self) -> ExecutionStatus {
        if let Some(report) = &self.report {
            return report.clone();
        }
        match &self.active {
            Some(active) => ExecutionStatus::Executing {
                command_id: active.id,
                motion: active.motion,
                progress: active.progress(),
            },
            None => ExecutionStatus::Idle,
        }
    }

    fn stop(&mut self, id: CommandId, base: &mut dyn LocomotionController) {
        self.deferred = None;
        let halted = self.active.take().map(|a| a.id);
        match base.halt() {
            Ok(()) => {
                info!(command_id = %id, halted = ?halted.map(|h| h.0), "stop completed");
                self.report = Some(ExecutionStatus::Completed { command_id: id });
            }
            Err(e) => {
                warn!(command_id = %id, error = %e, "stop could not halt the base");
                self.report = Some(ExecutionStatus::Failed {
                    command_id: id,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn start(&mut self, cmd: MoveCommand) {
        let total = cmd.motion.magnitude();
        let speed = cmd
            .speed
            .unwrap_or_else(|| self.limits.default_speed(&cmd.motion))
            .min(self.limits.cap(&cmd.motion));

        if !total.is_finite() || !(speed.is_finite() && speed > 0.0) {
            warn!(command_id = %cmd.id, motion = ?cmd.motion, speed, "rejecting unexecutable motion");
            self.report = Some(ExecutionStatus::Failed {
                command_id: cmd.id,
                reason: format!("cannot execute {:?} at speed {speed}", cmd.motion),
            });
            return;
        }

        info!(command_id = %cmd.id, motion = ?cmd.motion, speed, "motion started");
        self.active = Some(Active {
            id: cmd.id,
            motion: cmd.motion,
            speed,
            total,
            remaining: total,
        });
    }

    fn substep(&mut self, base: &mut dyn LocomotionController, dt: f32) {
        let Some(active) = self.active.as_mut() else {
            if let Err(e) = base.step(dt) {
                warn!(error = %e, "controller fault while idle");
            }
            return;
        };

        if active.remaining <= DONE_EPSILON {
            let id = active.id;
            self.finish(id, base);
            if let Err(e) = base.step(dt) {
                warn!(error = %e, "controller fault while idle");
            }
            return;
        }

        let (cmd, travelled) = active.base_command(dt);
        let result = base.command(cmd).and_then(|()| base.step(dt));
        match result {
            Ok(()) => {
                self.commanded = cmd;
                active.remaining = (active.remaining - travelled).max(0.0);
                if active.remaining <= DONE_EPSILON {
                    let id = active.id;
                    self.finish(id, base);
                }
            }
            Err(e) => {
                let id = active.id;
                self.active = None;
                self.halt(base);
                warn!(command_id = %id, error = %e, "motion failed");
                self.report = Some(ExecutionStatus::Failed {
                    command_id: id,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn finish(&mut self, id: CommandId, base: &mut dyn LocomotionController) {
        self.active = None;
        self.halt(base);
        info!(command_id = %id, "motion completed");
        self.report = Some(ExecutionStatus::Completed { command_id: id });
    }

    /// Best-effort halt; a failure here is logged, never escalated.
    fn halt(&self, base: &mut dyn LocomotionController) {
        if let Err(e) = base.halt() {
            warn!(controller = base.id(), error = %e, "halt failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use spotlink_hal::SimLocomotion;
    use spotlink_types::{Pose, SpotError, Velocity};

    const DT: f32 = 0.002;
    const SUBSTEPS: u32 = 10;

    fn cmd(id: u64, motion: Motion) -> MoveCommand {
        MoveCommand {
            id: CommandId(id),
            motion,
            speed: None,
            submitted_at: Utc::now(),
        }
    }

    fn base() -> SimLocomotion {
        SimLocomotion::new("test_base", [0.0, 0.0, 0.8])
    }

    /// Ticks until the status stops being `Executing`; returns (ticks, status).
    fn run_until_settled(
        exec: &mut CommandExecutor,
        base: &mut SimLocomotion,
        limit: usize,
    ) -> (usize, ExecutionStatus) {
        for n in 1..=limit {
            let status = exec.tick(None, base, SUBSTEPS, DT);
            if !matches!(status, ExecutionStatus::Executing { .. }) {
                return (n, status);
            }
        }
        panic!("motion did not settle within {limit} ticks");
    }

    #[test]
    fn forward_executes_then_completes_then_idles() {
        let mut exec = CommandExecutor::new(MotionLimits::default());
        let mut b = base();

        let first = exec.tick(Some(cmd(1, Motion::Forward(1.0))), &mut b, SUBSTEPS, DT);
        match first {
            ExecutionStatus::Executing { command_id, progress, .. } => {
                assert_eq!(command_id, CommandId(1));
                assert!(progress > 0.0 && progress < 0.05);
            }
            other => panic!("expected Executing, got {other:?}"),
        }

        // 1 m at 0.5 m/s = 2 s = 100 ticks of 20 ms.
        let (ticks, status) = run_until_settled(&mut exec, &mut b, 200);
        assert!((97..=101).contains(&ticks), "took {ticks} ticks");
        assert_eq!(status, ExecutionStatus::Completed { command_id: CommandId(1) });
        assert!((b.pose().position[0] - 1.0).abs() < 1e-3, "x = {}", b.pose().position[0]);

        assert_eq!(exec.tick(None, &mut b, SUBSTEPS, DT), ExecutionStatus::Idle);
        assert!(!exec.is_busy());
    }

    #[test]
    fn commanded_velocity_follows_the_active_motion() {
        let mut exec = CommandExecutor::new(MotionLimits::default());
        let mut b = base();
        assert_eq!(exec.commanded(), BaseCommand::ZERO);

        exec.tick(Some(cmd(1, Motion::Strafe(-0.5))), &mut b, SUBSTEPS, DT);
        assert_eq!(exec.commanded(), BaseCommand::new(0.0, -0.5, 0.0));

        exec.tick(Some(cmd(2, Motion::Stop)), &mut b, SUBSTEPS, DT);
        assert_eq!(exec.commanded(), BaseCommand::ZERO);
    }

    #[test]
    fn turn_reaches_target_angle() {
        let mut exec = CommandExecutor::new(MotionLimits::default());
        let mut b = base();
        let target = 90f32.to_radians();
        exec.tick(Some(cmd(1, Motion::Turn(-target))), &mut b, SUBSTEPS, DT);
        let (_, status) = run_until_settled(&mut exec, &mut b, 400);
        assert!(matches!(status, ExecutionStatus::Completed { .. }));
        assert!((b.pose().yaw_rad + target).abs() < 1e-3, "yaw = {}", b.pose().yaw_rad);
    }

    #[test]
    fn speed_override_is_capped() {
        let limits = MotionLimits {
            max_speed: 1.0,
            ..MotionLimits::default()
        };
        let mut exec = CommandExecutor::new(limits);
        let mut b = base();
        let mut fast = cmd(1, Motion::Forward(1.0));
        fast.speed = Some(10.0);
        exec.tick(Some(fast), &mut b, SUBSTEPS, DT);
        assert!((b.velocity().vx - 1.0).abs() < 1e-6);
        let (ticks, _) = run_until_settled(&mut exec, &mut b, 200);
        assert!((48..=51).contains(&ticks), "took {ticks} ticks");
    }

    #[test]
    fn preemption_reports_interrupted_then_starts_newcomer() {
        let mut exec = CommandExecutor::new(MotionLimits::default());
        let mut b = base();
        exec.tick(Some(cmd(1, Motion::Forward(1.0))), &mut b, SUBSTEPS, DT);
        exec.tick(None, &mut b, SUBSTEPS, DT);

        let status = exec.tick(Some(cmd(2, Motion::Turn(0.5))), &mut b, SUBSTEPS, DT);
        assert_eq!(
            status,
            ExecutionStatus::Interrupted {
                command_id: CommandId(1),
                superseded_by: CommandId(2),
            }
        );
        assert_eq!(b.velocity(), Velocity::default(), "old motion halted");
        assert!(exec.is_busy());

        match exec.tick(None, &mut b, SUBSTEPS, DT) {
            ExecutionStatus::Executing { command_id, motion, .. } => {
                assert_eq!(command_id, CommandId(2));
                assert_eq!(motion, Motion::Turn(0.5));
            }
            other => panic!("expected newcomer executing, got {other:?}"),
        }
    }

    #[test]
    fn submission_during_interrupted_tick_replaces_deferred() {
        let mut exec = CommandExecutor::new(MotionLimits::default());
        let mut b = base();
        exec.tick(Some(cmd(1, Motion::Forward(1.0))), &mut b, SUBSTEPS, DT);
        exec.tick(Some(cmd(2, Motion::Turn(0.5))), &mut b, SUBSTEPS, DT);
        let status = exec.tick(Some(cmd(3, Motion::Strafe(0.2))), &mut b, SUBSTEPS, DT);
        assert_eq!(status.command_id(), Some(CommandId(3)));
        assert!(matches!(status, ExecutionStatus::Executing { .. }));
    }

    #[test]
    fn stop_completes_within_its_tick_and_freezes_pose() {
        let mut exec = CommandExecutor::new(MotionLimits::default());
        let mut b = base();
        exec.tick(Some(cmd(1, Motion::Turn(1.5))), &mut b, SUBSTEPS, DT);
        for _ in 0..10 {
            exec.tick(None, &mut b, SUBSTEPS, DT);
        }
        let partial = b.pose();
        assert!(partial.yaw_rad > 0.0);

        let status = exec.tick(Some(cmd(2, Motion::Stop)), &mut b, SUBSTEPS, DT);
        assert_eq!(status, ExecutionStatus::Completed { command_id: CommandId(2) });
        assert_eq!(b.pose(), partial);

        assert_eq!(exec.tick(None, &mut b, SUBSTEPS, DT), ExecutionStatus::Idle);
        assert_eq!(b.pose(), partial);
    }

    #[test]
    fn stop_discards_deferred_newcomer() {
        let mut exec = CommandExecutor::new(MotionLimits::default());
        let mut b = base();
        exec.tick(Some(cmd(1, Motion::Forward(1.0))), &mut b, SUBSTEPS, DT);
        exec.tick(Some(cmd(2, Motion::Forward(1.0))), &mut b, SUBSTEPS, DT);
        exec.tick(Some(cmd(3, Motion::Stop)), &mut b, SUBSTEPS, DT);
        assert!(!exec.is_busy());
        assert_eq!(exec.tick(None, &mut b, SUBSTEPS, DT), ExecutionStatus::Idle);
    }

    #[test]
    fn stop_while_idle_still_completes() {
        let mut exec = CommandExecutor::new(MotionLimits::default());
        let mut b = base();
        let status = exec.tick(Some(cmd(5, Motion::Stop)), &mut b, SUBSTEPS, DT);
        assert_eq!(status, ExecutionStatus::Completed { command_id: CommandId(5) });
    }

    struct FaultyBase {
        steps_until_fault: u32,
        halted: bool,
    }

    impl LocomotionController for FaultyBase {
        fn id(&self) -> &str {
            "faulty"
        }
        fn command(&mut self, _cmd: BaseCommand) -> Result<(), SpotError> {
            self.halted = false;
            Ok(())
        }
        fn halt(&mut self) -> Result<(), SpotError> {
            self.halted = true;
            Ok(())
        }
        fn step(&mut self, _dt: f32) -> Result<(), SpotError> {
            if self.steps_until_fault == 0 {
                return Err(SpotError::Actuation {
                    component: "faulty".into(),
                    details: "pose unreachable".into(),
                });
            }
            self.steps_until_fault -= 1;
            Ok(())
        }
        fn pose(&self) -> Pose {
            Pose::default()
        }
        fn velocity(&self) -> Velocity {
            Velocity::default()
        }
    }

    #[test]
    fn actuation_error_records_failed_without_retry() {
        let mut exec = CommandExecutor::new(MotionLimits::default());
        let mut b = FaultyBase {
            steps_until_fault: 25,
            halted: false,
        };
        exec.tick(Some(cmd(1, Motion::Forward(1.0))), &mut b, SUBSTEPS, DT);
        exec.tick(None, &mut b, SUBSTEPS, DT);
        let status = exec.tick(None, &mut b, SUBSTEPS, DT);
        match status {
            ExecutionStatus::Failed { command_id, reason } => {
                assert_eq!(command_id, CommandId(1));
                assert!(reason.contains("pose unreachable"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(b.halted);

        // No retry: the next tick is idle even though the base keeps faulting.
        assert_eq!(exec.tick(None, &mut b, SUBSTEPS, DT), ExecutionStatus::Idle);
        assert!(!exec.is_busy());
    }

    #[test]
    fn non_finite_motion_fails_immediately() {
        let mut exec = CommandExecutor::new(MotionLimits::default());
        let mut b = base();
        let status = exec.tick(Some(cmd(1, Motion::Forward(f32::NAN))), &mut b, SUBSTEPS, DT);
        assert!(matches!(status, ExecutionStatus::Failed { .. }));
    }

    #[test]
    fn heading_error_is_not_corrected_between_commands() {
        let mut exec = CommandExecutor::new(MotionLimits::default());
        let mut b = base();
        exec.tick(Some(cmd(1, Motion::Turn(0.3))), &mut b, SUBSTEPS, DT);
        run_until_settled(&mut exec, &mut b, 200);
        exec.tick(None, &mut b, SUBSTEPS, DT);

        exec.tick(Some(cmd(2, Motion::Forward(1.0))), &mut b, SUBSTEPS, DT);
        run_until_settled(&mut exec, &mut b, 200);
        // Forward is along the rotated heading, not world x.
        let p = b.pose().position;
        assert!((p[0] - 0.3f32.cos()).abs() < 1e-3);
        assert!((p[1] - 0.3f32.sin()).abs() < 1e-3);
    }
}
