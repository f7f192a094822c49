//! Error types for camera and serial operations.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to the camera or the gate controller.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Device communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Device could not be opened.
    #[error("Open failed: {message}")]
    OpenFailed { message: String },

    /// Frame capture error.
    #[error("Capture error: {message}")]
    CaptureError { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port driver error.
    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new open failed error.
    pub fn open_failed(message: impl Into<String>) -> Self {
        Self::OpenFailed {
            message: message.into(),
        }
    }

    /// Create a new capture error.
    pub fn capture(message: impl Into<String>) -> Self {
        Self::CaptureError {
            message: message.into(),
        }
    }

    /// Returns `true` for errors caused by a deadline expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_error() {
        let error = HardwareError::disconnected("/dev/ttyACM0");
        assert!(matches!(error, HardwareError::Disconnected { .. }));
        assert_eq!(error.to_string(), "Device disconnected: /dev/ttyACM0");
    }

    #[test]
    fn test_timeout_error() {
        let error = HardwareError::timeout(2000);
        assert!(error.is_timeout());
        assert_eq!(error.to_string(), "Operation timeout after 2000ms");
    }

    #[test]
    fn test_capture_error() {
        let error = HardwareError::capture("empty frame");
        assert!(!error.is_timeout());
        assert_eq!(error.to_string(), "Capture error: empty frame");
    }

    #[test]
    fn test_open_failed_error() {
        let error = HardwareError::open_failed("permission denied");
        assert_eq!(error.to_string(), "Open failed: permission denied");
    }
}
