//! `spotlink-hal` – Robot Hardware Abstraction
//!
//! The seams between the bridge and whatever actually moves the robot.
//!
//! # Modules
//!
//! - [`locomotion`] – [`LocomotionController`][locomotion::LocomotionController]:
//!   the velocity interface of the pretrained walking controller.  The
//!   command executor translates motion intents into [`BaseCommand`]s and
//!   steps the controller once per physics substep.
//! - [`camera`] – [`Camera`][camera::Camera]: body-mounted image capture.
//! - [`sim`] – kinematic stand-ins for both seams so the whole stack runs
//!   headless in tests and on machines without a physics engine.

pub mod camera;
pub mod locomotion;
pub mod sim;

pub use camera::{Camera, RawImage};
pub use locomotion::{BaseCommand, LocomotionController};
pub use sim::{SimCamera, SimLocomotion, SimRobot};
