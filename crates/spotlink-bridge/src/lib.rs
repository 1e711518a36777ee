//! `spotlink-bridge` – the concurrency boundary between the simulation tick
//! and everything that talks to the robot.
//!
//! # Modules
//!
//! - [`snapshot`] – copy-on-publish store of the latest state/frame pair.
//! - [`channel`] – single-slot command mailbox with a stop-biased
//!   tie-break.
//! - [`executor`] – per-tick motion state machine over a
//!   [`LocomotionController`][spotlink_hal::LocomotionController].
//! - [`facade`] – [`Bridge`], the cloneable handle servers and clients use.
//! - [`status_bus`] – optional broadcast of status transitions.
//! - [`tick_loop`] – [`SimulationLoop`], the single writer.
//!
//! # Wiring
//!
//! ```rust
//! use spotlink_bridge::{Bridge, LoopConfig, MotionLimits, SimulationLoop};
//! use spotlink_hal::SimRobot;
//!
//! let (bridge, endpoint) = Bridge::new(MotionLimits::default());
//! let robot = SimRobot::builder().build();
//! let mut sim = SimulationLoop::new(
//!     LoopConfig::fast(),
//!     endpoint,
//!     Box::new(robot.locomotion),
//!     Box::new(robot.camera),
//! )
//! .unwrap();
//!
//! bridge.submit_move("forward", 1.0).unwrap();
//! sim.tick();
//! assert!(bridge.get_state().status.command_id().is_some());
//! ```

pub mod channel;
pub mod executor;
pub mod facade;
pub mod snapshot;
pub mod status_bus;
pub mod tick_loop;

pub use channel::{CommandReceiver, CommandSender, SubmitReceipt, command_channel};
pub use executor::{CommandExecutor, MotionLimits};
pub use facade::{Bridge, MoveAck, SimEndpoint};
pub use snapshot::{Snapshot, SnapshotReader, SnapshotStore, SnapshotWriter};
pub use status_bus::{StatusBus, StatusEvent};
pub use tick_loop::{LoopConfig, SimulationLoop};
