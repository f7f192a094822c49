//! Device trait definitions.
//!
//! These traits are the contract between the capture/actuation stages and the
//! devices behind them, so the same pipeline runs against ffmpeg and a real
//! serial port or against the mocks in [`crate::mock`].
//!
//! All traits use native `async fn` methods (Edition 2024 RPITIT). They are
//! not object-safe; see [`crate::devices`] for the enum wrappers used for
//! runtime selection.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::types::{DeviceInfo, ImageFrame, SerialSettings};
use std::time::Duration;

/// A camera that can produce a single still frame on demand.
///
/// Each call opens the named device, reads one frame and releases the device
/// again, also when the returned future is dropped before completion.
///
/// # Examples
///
/// ```no_run
/// use parkgate_hardware::traits::CameraDevice;
/// use parkgate_hardware::Result;
///
/// async fn frame_size<C: CameraDevice>(camera: &mut C) -> Result<usize> {
///     let frame = camera.grab_frame("/dev/video0").await?;
///     Ok(frame.len())
/// }
/// ```
pub trait CameraDevice: Send + Sync {
    /// Grab exactly one frame from `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened or yields no data.
    async fn grab_frame(&mut self, device: &str) -> Result<ImageFrame>;

    /// Describe the backend.
    fn info(&self) -> DeviceInfo;
}

/// Opens serial links to the gate controller.
pub trait SerialConnector: Send + Sync {
    /// Link type handed out by [`open`](Self::open).
    type Link: SerialLink;

    /// Open the port described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the port does not exist, is busy, or rejects the
    /// baud rate.
    async fn open(&self, settings: &SerialSettings) -> Result<Self::Link>;
}

/// An open serial link. The port is closed when the link is dropped.
pub trait SerialLink: Send {
    /// Wait up to `wait` for any byte from the device.
    ///
    /// Returns `Ok(true)` if a byte arrived, `Ok(false)` if the wait ran out.
    /// A silent device is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the port fails while reading.
    async fn wait_ready(&mut self, wait: Duration) -> Result<bool>;

    /// Write the whole buffer and flush it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the driver times out.
    async fn send(&mut self, data: &[u8]) -> Result<()>;
}
