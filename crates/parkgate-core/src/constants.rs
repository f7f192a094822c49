//! Default values shared by the worker crates.
//!
//! Every timeout and interval here can be overridden through the worker
//! configuration; these are the values used when nothing is configured.
//!
//! ```
//! use parkgate_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(DEFAULT_TRIGGER_MESSAGE, "START");
//! let timeout = Duration::from_millis(DEFAULT_RECOGNITION_TIMEOUT_MS);
//! assert_eq!(timeout.as_secs(), 10);
//! ```

// ============================================================================
// Signal store
// ============================================================================

/// Path polled for the "vehicle arrived" signal.
pub const DEFAULT_TRIGGER_PATH: &str = "parking/car_detected";

/// Interval between two reads of the trigger path.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Value injected as the signal when the store is bypassed.
pub const DEFAULT_MOCK_SIGNAL: &str = "manual";

// ============================================================================
// Camera
// ============================================================================

/// Capture device opened when none is configured.
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

/// ffmpeg input format for the capture device.
pub const DEFAULT_CAMERA_INPUT_FORMAT: &str = "v4l2";

/// Upper bound for grabbing one frame, including device open.
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 10_000;

/// Directory that receives captured frames.
pub const DEFAULT_CAPTURE_DIR: &str = "captures";

// ============================================================================
// Services
// ============================================================================

pub const DEFAULT_RECOGNITION_URL: &str = "http://localhost:8001/v1/recognize";

pub const DEFAULT_RECOGNITION_TIMEOUT_MS: u64 = 10_000;

pub const DEFAULT_MATCH_URL: &str = "http://localhost:8000/api/reservations/match";

pub const DEFAULT_MATCH_TIMEOUT_MS: u64 = 5_000;

/// Multipart field carrying the uploaded image.
pub const DEFAULT_UPLOAD_FIELD: &str = "file";

/// Response field holding the recognized plate text.
pub const DEFAULT_PLATE_FIELD: &str = "plate";

/// Longest plate text accepted after normalization, in characters.
pub const MAX_PLATE_LENGTH: usize = 16;

// ============================================================================
// Serial actuation
// ============================================================================

pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";

pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Trigger message sent to the gate controller. Any byte starts it.
pub const DEFAULT_TRIGGER_MESSAGE: &str = "START";

/// Time allowed for the board to come up after the port is opened.
pub const DEFAULT_SERIAL_WAIT_MS: u64 = 2_000;

/// Upper bound for writing the trigger message.
pub const DEFAULT_SERIAL_TIMEOUT_MS: u64 = 2_000;

// ============================================================================
// Reports and loop
// ============================================================================

pub const DEFAULT_REPORT_DIR: &str = "reports";

/// Pause between two cycles in continuous mode.
pub const DEFAULT_CYCLE_INTERVAL_MS: u64 = 5_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_defaults() {
        assert_eq!(DEFAULT_BAUD_RATE, 9600);
        assert!(!DEFAULT_TRIGGER_MESSAGE.is_empty());
        assert!(DEFAULT_TRIGGER_MESSAGE.is_ascii());
    }
}
