//! Enum wrappers for device dispatch.
//!
//! Native `async fn` in traits is not object-safe, so `Box<dyn CameraDevice>`
//! is not available. The worker picks its backends at startup (real devices
//! or mocks for `--simulate`) and stores them in these enums instead.
//!
//! # Examples
//!
//! ```
//! use parkgate_hardware::devices::AnyCameraDevice;
//! use parkgate_hardware::mock::MockCamera;
//!
//! let (camera, _handle) = MockCamera::new();
//! let camera = AnyCameraDevice::Mock(camera);
//! assert_eq!(camera.kind(), "mock");
//! ```

use crate::camera::FfmpegCamera;
use crate::mock::{MockCamera, MockSerialConnector, MockSerialLink};
use crate::serial::{SerialPortConnector, SerialPortLink};
use crate::traits::{CameraDevice, SerialConnector, SerialLink};
use crate::{DeviceInfo, ImageFrame, Result, SerialSettings};
use std::time::Duration;

/// Enum wrapper for camera dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyCameraDevice {
    /// Capture through an ffmpeg child process.
    Ffmpeg(FfmpegCamera),
    /// Mock camera for development and testing.
    Mock(MockCamera),
}

impl AnyCameraDevice {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ffmpeg(_) => "ffmpeg",
            Self::Mock(_) => "mock",
        }
    }
}

impl CameraDevice for AnyCameraDevice {
    async fn grab_frame(&mut self, device: &str) -> Result<ImageFrame> {
        match self {
            Self::Ffmpeg(camera) => camera.grab_frame(device).await,
            Self::Mock(camera) => camera.grab_frame(device).await,
        }
    }

    fn info(&self) -> DeviceInfo {
        match self {
            Self::Ffmpeg(camera) => camera.info(),
            Self::Mock(camera) => camera.info(),
        }
    }
}

/// Enum wrapper for serial connector dispatch.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnySerialConnector {
    /// Real serial port.
    Port(SerialPortConnector),
    /// Mock connector for development and testing.
    Mock(MockSerialConnector),
}

impl SerialConnector for AnySerialConnector {
    type Link = AnySerialLink;

    async fn open(&self, settings: &SerialSettings) -> Result<AnySerialLink> {
        match self {
            Self::Port(connector) => connector.open(settings).await.map(AnySerialLink::Port),
            Self::Mock(connector) => connector.open(settings).await.map(AnySerialLink::Mock),
        }
    }
}

/// Link type for [`AnySerialConnector`].
#[derive(Debug)]
pub enum AnySerialLink {
    Port(SerialPortLink),
    Mock(MockSerialLink),
}

impl SerialLink for AnySerialLink {
    async fn wait_ready(&mut self, wait: Duration) -> Result<bool> {
        match self {
            Self::Port(link) => link.wait_ready(wait).await,
            Self::Mock(link) => link.wait_ready(wait).await,
        }
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Port(link) => link.send(data).await,
            Self::Mock(link) => link.send(data).await,
        }
    }
}
