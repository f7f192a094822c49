//! Mock devices for testing and bench runs without hardware.
//!
//! Each mock is created together with a handle that stays with the test (or
//! the `--simulate` runner) to script behavior and inspect what happened.

mod camera;
mod serial;

pub use camera::{MockCamera, MockCameraHandle, SAMPLE_JPEG};
pub use serial::{MockSerialConnector, MockSerialHandle, MockSerialLink, WriteBehavior};
