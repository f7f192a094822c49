//! Frame capture stage.

use crate::error::{HardwareError, Result};
use crate::traits::CameraDevice;
use chrono::{DateTime, Utc};
use parkgate_core::CycleId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A frame written to disk. The file is kept after the cycle ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedFrame {
    pub path: PathBuf,
    pub captured_at: DateTime<Utc>,
    /// Capture device the frame came from.
    pub device: String,
    /// Size of the written file.
    pub bytes: usize,
}

/// Build the per-cycle output path `<dir>/<timestamp>-c<cycle>.jpg`.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use parkgate_core::CycleId;
/// use parkgate_hardware::capture::frame_path;
/// use std::path::Path;
///
/// let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
/// let path = frame_path(Path::new("captures"), at, CycleId::new(7));
/// assert_eq!(path, Path::new("captures/20240501T083000000Z-c000007.jpg"));
/// ```
pub fn frame_path(dir: &Path, at: DateTime<Utc>, cycle: CycleId) -> PathBuf {
    dir.join(format!("{}-c{cycle}.jpg", at.format("%Y%m%dT%H%M%S%3fZ")))
}

/// Takes one frame from a camera and stores it.
#[derive(Debug)]
pub struct FrameCapturer<C> {
    camera: C,
    timeout: Duration,
}

impl<C: CameraDevice> FrameCapturer<C> {
    pub fn new(camera: C, timeout: Duration) -> Self {
        Self { camera, timeout }
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    /// Grab one frame from `device` and write it to `output_path`.
    ///
    /// Parent directories are created as needed. The device is released
    /// before this returns, whether or not the grab succeeded.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Timeout` if no frame arrives within the
    /// capture timeout, `HardwareError::CaptureError` for an empty frame, and
    /// the camera's or the filesystem's error otherwise.
    pub async fn capture(&mut self, device: &str, output_path: &Path) -> Result<CapturedFrame> {
        debug!(device, path = %output_path.display(), "Capturing frame");

        let frame = match tokio::time::timeout(self.timeout, self.camera.grab_frame(device)).await
        {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                warn!(device, error = %e, "Camera error");
                return Err(e);
            }
            Err(_) => {
                let duration_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(device, timeout_ms = duration_ms, "Capture timed out");
                return Err(HardwareError::timeout(duration_ms));
            }
        };

        if frame.is_empty() {
            return Err(HardwareError::capture(format!("empty frame from {device}")));
        }

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(output_path, &frame.data).await?;

        info!(
            device,
            path = %output_path.display(),
            bytes = frame.len(),
            "Frame captured"
        );

        Ok(CapturedFrame {
            path: output_path.to_path_buf(),
            captured_at: frame.captured_at,
            device: device.to_string(),
            bytes: frame.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImageFrame;
    use crate::mock::{MockCamera, SAMPLE_JPEG};
    use crate::types::DeviceInfo;

    /// Camera that never answers.
    struct StuckCamera;

    impl CameraDevice for StuckCamera {
        async fn grab_frame(&mut self, _device: &str) -> Result<ImageFrame> {
            std::future::pending().await
        }

        fn info(&self) -> DeviceInfo {
            DeviceInfo::new("stuck", "test")
        }
    }

    #[tokio::test]
    async fn test_capture_writes_file_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/captures/frame.jpg");
        let (camera, handle) = MockCamera::new();
        let mut capturer = FrameCapturer::new(camera, Duration::from_secs(1));

        let frame = capturer.capture("/dev/video0", &path).await.unwrap();

        assert_eq!(frame.path, path);
        assert_eq!(frame.device, "/dev/video0");
        assert_eq!(frame.bytes, SAMPLE_JPEG.len());
        assert_eq!(std::fs::read(&path).unwrap(), SAMPLE_JPEG);
        assert_eq!(handle.grab_count(), 1);
    }

    #[tokio::test]
    async fn test_camera_error_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        let (camera, handle) = MockCamera::new();
        handle.fail_next("no such device");
        let mut capturer = FrameCapturer::new(camera, Duration::from_secs(1));

        let result = capturer.capture("/dev/video9", &path).await;

        assert!(matches!(result, Err(HardwareError::CaptureError { .. })));
        assert!(!path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut capturer = FrameCapturer::new(StuckCamera, Duration::from_millis(500));

        let result = capturer
            .capture("/dev/video0", &dir.path().join("frame.jpg"))
            .await;

        assert!(matches!(result, Err(HardwareError::Timeout { duration_ms: 500 })));
    }
}
