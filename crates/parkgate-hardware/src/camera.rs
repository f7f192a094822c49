//! Camera backend built on the `ffmpeg` command line tool.
//!
//! One frame is read per call:
//!
//! ```text
//! ffmpeg -hide_banner -loglevel error -f <input_format> -i <device>
//!        -frames:v 1 -f image2pipe -vcodec mjpeg -
//! ```
//!
//! The child is spawned with `kill_on_drop`, so a timed-out or cancelled
//! capture releases the device.

use crate::error::{HardwareError, Result};
use crate::traits::CameraDevice;
use crate::types::{DeviceInfo, ImageFrame};
use parkgate_core::constants::DEFAULT_CAMERA_INPUT_FORMAT;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};

/// Single-frame capture through an `ffmpeg` child process.
#[derive(Debug, Clone)]
pub struct FfmpegCamera {
    binary: String,
    input_format: String,
}

impl FfmpegCamera {
    /// Create a camera using `ffmpeg` from `PATH` and the default input format.
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            input_format: DEFAULT_CAMERA_INPUT_FORMAT.to_string(),
        }
    }

    /// Use a specific ffmpeg binary.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the ffmpeg input format (`v4l2`, `dshow`, `avfoundation`, ...).
    pub fn with_input_format(mut self, input_format: impl Into<String>) -> Self {
        self.input_format = input_format.into();
        self
    }

    pub(crate) fn args(&self, device: &str) -> Vec<String> {
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            self.input_format.as_str(),
            "-i",
            device,
            "-frames:v",
            "1",
            "-f",
            "image2pipe",
            "-vcodec",
            "mjpeg",
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

impl Default for FfmpegCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDevice for FfmpegCamera {
    async fn grab_frame(&mut self, device: &str) -> Result<ImageFrame> {
        let args = self.args(device);
        trace!(binary = %self.binary, ?args, "Spawning ffmpeg");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HardwareError::open_failed(format!("{}: {e}", self.binary)))?;

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HardwareError::capture(format!(
                "ffmpeg exited with {} for {device}: {}",
                output.status,
                stderr.trim()
            )));
        }

        if output.stdout.is_empty() {
            return Err(HardwareError::capture(format!("empty frame from {device}")));
        }

        let frame = ImageFrame::new(output.stdout);
        if !frame.is_jpeg() {
            return Err(HardwareError::invalid_data(format!(
                "{device} did not produce a JPEG frame ({} bytes)",
                frame.len()
            )));
        }

        debug!(device, bytes = frame.len(), "Frame read");
        Ok(frame)
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo::new(&self.binary, format!("ffmpeg/{}", self.input_format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_args() {
        let camera = FfmpegCamera::new().with_input_format("dshow");
        let args = camera.args("video=USB Camera");

        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "video=USB Camera");
        assert_eq!(args[input - 1], "dshow");
        assert_eq!(args.last().map(String::as_str), Some("-"));
        assert!(args.windows(2).any(|w| w[0] == "-frames:v" && w[1] == "1"));
    }

    #[test]
    fn test_ffmpeg_info() {
        let camera = FfmpegCamera::new().with_binary("/usr/bin/ffmpeg");
        let info = camera.info();
        assert_eq!(info.name, "/usr/bin/ffmpeg");
        assert_eq!(info.backend, "ffmpeg/v4l2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_jpeg_output_is_invalid_data() {
        // `echo` prints its arguments instead of image bytes.
        let mut camera = FfmpegCamera::new().with_binary("echo");
        let result = camera.grab_frame("/dev/video0").await;
        assert!(matches!(result, Err(HardwareError::InvalidData { .. })));
    }

    #[tokio::test]
    async fn test_missing_binary_is_open_failure() {
        let mut camera = FfmpegCamera::new().with_binary("/nonexistent/parkgate-ffmpeg");
        let result = camera.grab_frame("/dev/video0").await;
        assert!(matches!(result, Err(HardwareError::OpenFailed { .. })));
    }
}
