//! Types shared by the camera and serial implementations.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Generic device information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name (e.g., "/dev/video0", "MockSerial").
    pub name: String,

    /// Backend driving the device (e.g., "ffmpeg/v4l2", "serialport").
    pub backend: String,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: backend.into(),
        }
    }
}

/// One still image grabbed from a camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFrame {
    /// Encoded image bytes (JPEG).
    pub data: Bytes,

    /// When the frame was read from the device.
    pub captured_at: DateTime<Utc>,
}

impl ImageFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            captured_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if the data starts with the JPEG start-of-image marker.
    #[must_use]
    pub fn is_jpeg(&self) -> bool {
        self.data.starts_with(&[0xFF, 0xD8])
    }
}

/// Parameters for opening a serial link to the gate controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Port path (e.g., "/dev/ttyACM0", "COM3").
    pub port: String,

    pub baud_rate: u32,

    /// Read/write timeout applied by the driver.
    pub timeout: Duration,
}

impl SerialSettings {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            timeout: Duration::from_millis(parkgate_core::constants::DEFAULT_SERIAL_TIMEOUT_MS),
        }
    }

    /// Set the driver timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
