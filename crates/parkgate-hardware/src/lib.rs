//! Device layer of the parking gate worker: the camera that photographs the
//! arriving vehicle and the serial line that releases the gate.
//!
//! # Devices
//!
//! - [`CameraDevice`]: grabs one still frame from a named capture device.
//!   [`FfmpegCamera`](camera::FfmpegCamera) is the production backend.
//! - [`SerialConnector`] / [`SerialLink`]: opens the gate controller's port
//!   and writes the trigger message.
//!   [`SerialPortConnector`](serial::SerialPortConnector) is the production
//!   backend.
//!
//! Both have mock implementations in [`mock`], used by the tests and by the
//! worker's `--simulate` mode, and enum wrappers in [`devices`] for choosing
//! between them at runtime.
//!
//! # Stages
//!
//! - [`FrameCapturer`](capture::FrameCapturer) bounds a grab with a timeout
//!   and stores the frame on disk.
//! - [`Actuator`](actuator::Actuator) runs one open/wait/send/close sequence
//!   and reports it as an [`ActuationRecord`](actuator::ActuationRecord).
//!
//! ```
//! use parkgate_hardware::actuator::{Actuator, SerialConfig};
//! use parkgate_hardware::mock::MockSerialConnector;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (connector, handle) = MockSerialConnector::new();
//!     let actuator = Actuator::new(connector, SerialConfig::default().wait(None));
//!
//!     let record = actuator.actuate().await;
//!     assert!(record.succeeded());
//!     assert_eq!(handle.writes(), vec![b"START\n".to_vec()]);
//! }
//! ```

pub mod actuator;
pub mod camera;
pub mod capture;
pub mod devices;
pub mod error;
pub mod mock;
pub mod serial;
pub mod traits;
pub mod types;

pub use error::{HardwareError, Result};
pub use traits::{CameraDevice, SerialConnector, SerialLink};
pub use types::{DeviceInfo, ImageFrame, SerialSettings};
