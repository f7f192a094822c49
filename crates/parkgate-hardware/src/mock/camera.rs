//! Mock camera serving scripted frames.

use crate::error::{HardwareError, Result};
use crate::traits::CameraDevice;
use crate::types::{DeviceInfo, ImageFrame};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// A tiny but well-formed JPEG (SOI, APP0, EOI).
pub const SAMPLE_JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xD9,
];

#[derive(Debug)]
struct State {
    frame: Bytes,
    failures: VecDeque<String>,
    devices: Vec<String>,
}

/// Mock camera.
///
/// Every grab returns the configured frame ([`SAMPLE_JPEG`] by default)
/// unless a failure was queued through the handle.
///
/// # Examples
///
/// ```
/// use parkgate_hardware::mock::MockCamera;
/// use parkgate_hardware::traits::CameraDevice;
///
/// #[tokio::main]
/// async fn main() -> parkgate_hardware::Result<()> {
///     let (mut camera, handle) = MockCamera::new();
///
///     let frame = camera.grab_frame("/dev/video0").await?;
///     assert!(frame.is_jpeg());
///
///     handle.fail_next("device busy");
///     assert!(camera.grab_frame("/dev/video0").await.is_err());
///     assert_eq!(handle.grab_count(), 2);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockCamera {
    state: Arc<Mutex<State>>,
}

impl MockCamera {
    /// Create a new mock camera and its control handle.
    pub fn new() -> (Self, MockCameraHandle) {
        let state = Arc::new(Mutex::new(State {
            frame: Bytes::from_static(SAMPLE_JPEG),
            failures: VecDeque::new(),
            devices: Vec::new(),
        }));

        let camera = Self {
            state: Arc::clone(&state),
        };
        (camera, MockCameraHandle { state })
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new().0
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CameraDevice for MockCamera {
    async fn grab_frame(&mut self, device: &str) -> Result<ImageFrame> {
        let mut state = lock(&self.state);
        state.devices.push(device.to_string());

        if let Some(message) = state.failures.pop_front() {
            return Err(HardwareError::capture(message));
        }

        if state.frame.is_empty() {
            return Err(HardwareError::capture(format!("empty frame from {device}")));
        }

        Ok(ImageFrame::new(state.frame.clone()))
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo::new("MockCamera", "mock")
    }
}

/// Handle for scripting and inspecting a [`MockCamera`].
#[derive(Debug, Clone)]
pub struct MockCameraHandle {
    state: Arc<Mutex<State>>,
}

impl MockCameraHandle {
    /// Replace the frame returned by subsequent grabs.
    pub fn set_frame(&self, frame: impl Into<Bytes>) {
        lock(&self.state).frame = frame.into();
    }

    /// Make the next grab fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        lock(&self.state).failures.push_back(message.into());
    }

    /// Number of grabs attempted so far.
    pub fn grab_count(&self) -> usize {
        lock(&self.state).devices.len()
    }

    /// Device names passed to each grab, in order.
    pub fn devices(&self) -> Vec<String> {
        lock(&self.state).devices.clone()
    }
}
