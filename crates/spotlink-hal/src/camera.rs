//! Generic `Camera` trait and supporting types for body-mounted cameras.

use spotlink_types::{Pose, SpotError};

/// An uncompressed image returned by a camera driver.
#[derive(Debug, Clone)]
pub struct RawImage {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Tightly packed RGBA8 rows, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

/// A camera rigidly mounted on the robot body.
pub trait Camera: Send {
    /// Stable identifier for this camera, e.g. `"body_rgb"`.
    fn id(&self) -> &str;

    /// Capture the current view.
    ///
    /// `body_pose` is the pose of the body the camera is mounted on, for
    /// drivers that render rather than read a sensor.
    ///
    /// # Errors
    ///
    /// Returns [`SpotError::Actuation`] if no frame is available this tick
    /// (sensor not initialised, render product missing).
    fn capture(&mut self, body_pose: &Pose) -> Result<RawImage, SpotError>;
}
