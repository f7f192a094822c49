//! Worker configuration.
//!
//! [`WorkerConfig`] groups the settings of every stage. Each group has a
//! `Default` matching the constants in `parkgate_core::constants`, and
//! chained setters for overrides:
//!
//! ```
//! use parkgate_pipeline::config::{LoopConfig, WorkerConfig};
//! use std::time::Duration;
//!
//! let config = WorkerConfig::default()
//!     .with_store_url("https://demo.firebaseio.com")
//!     .with_loop(LoopConfig::default().continuous(true).interval(Duration::from_secs(2)));
//!
//! assert!(config.validate().is_ok());
//! ```

use parkgate_core::constants::{
    DEFAULT_CAMERA_DEVICE, DEFAULT_CAMERA_INPUT_FORMAT, DEFAULT_CAPTURE_DIR,
    DEFAULT_CAPTURE_TIMEOUT_MS, DEFAULT_CYCLE_INTERVAL_MS, DEFAULT_REPORT_DIR,
};
use parkgate_core::{PipelineError, Result};
use parkgate_network::{MatchConfig, RecognitionConfig};
use std::path::PathBuf;
use std::time::Duration;

pub use parkgate_hardware::actuator::SerialConfig;
pub use parkgate_network::signal::{ArmCondition, SignalConfig};

/// Connection to the signal store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Base URL of the Realtime Database; not needed when bypassed.
    pub base_url: Option<String>,
    pub auth_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            auth_token: None,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    /// Capture device name passed to the backend.
    pub device: String,
    pub input_format: String,
    pub ffmpeg_binary: String,
    pub timeout: Duration,
    /// Where frames are stored.
    pub capture_dir: PathBuf,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_CAMERA_DEVICE.to_string(),
            input_format: DEFAULT_CAMERA_INPUT_FORMAT.to_string(),
            ffmpeg_binary: "ffmpeg".to_string(),
            timeout: Duration::from_millis(DEFAULT_CAPTURE_TIMEOUT_MS),
            capture_dir: PathBuf::from(DEFAULT_CAPTURE_DIR),
        }
    }
}

impl CameraConfig {
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn capture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.capture_dir = dir.into();
        self
    }
}

/// Recognition and match endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceConfig {
    pub recognition: RecognitionConfig,
    pub matching: MatchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    pub dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_REPORT_DIR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Keep running cycles until shutdown.
    pub continuous: bool,
    /// Pause after each cycle in continuous mode.
    pub interval: Duration,
    /// Give up waiting for a signal after this long; `None` waits forever.
    pub signal_timeout: Option<Duration>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            interval: Duration::from_millis(DEFAULT_CYCLE_INTERVAL_MS),
            signal_timeout: None,
        }
    }
}

impl LoopConfig {
    pub fn continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn signal_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.signal_timeout = timeout;
        self
    }
}

/// Everything a worker needs to run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkerConfig {
    pub signal: SignalConfig,
    pub store: StoreConfig,
    pub camera: CameraConfig,
    pub services: ServiceConfig,
    pub serial: SerialConfig,
    pub report: ReportConfig,
    pub loop_config: LoopConfig,
    /// Use mock camera and serial devices.
    pub simulate: bool,
}

impl WorkerConfig {
    pub fn with_signal(mut self, signal: SignalConfig) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_store_url(mut self, url: impl Into<String>) -> Self {
        self.store.base_url = Some(url.into());
        self
    }

    pub fn with_camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_services(mut self, services: ServiceConfig) -> Self {
        self.services = services;
        self
    }

    pub fn with_serial(mut self, serial: SerialConfig) -> Self {
        self.serial = serial;
        self
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report.dir = dir.into();
        self
    }

    pub fn with_loop(mut self, loop_config: LoopConfig) -> Self {
        self.loop_config = loop_config;
        self
    }

    pub fn with_simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Check settings that would make every cycle fail.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.signal.bypass.is_none() && self.store.base_url.is_none() {
            return Err(PipelineError::config(
                "signal store URL is required unless the signal is bypassed",
            ));
        }
        if self.signal.trigger_path.trim_matches('/').is_empty() {
            return Err(PipelineError::config("trigger path must not be empty"));
        }
        if self.signal.poll_interval.is_zero() {
            return Err(PipelineError::config("poll interval must be positive"));
        }
        if self.camera.device.is_empty() {
            return Err(PipelineError::config("camera device must not be empty"));
        }

        let timeouts = [
            ("capture timeout", self.camera.timeout),
            ("recognition timeout", self.services.recognition.timeout),
            ("match timeout", self.services.matching.timeout),
            ("serial timeout", self.serial.timeout),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, timeout)| timeout.is_zero()) {
            return Err(PipelineError::config(format!("{name} must be positive")));
        }

        if self.services.recognition.url.is_empty() || self.services.matching.url.is_empty() {
            return Err(PipelineError::config("service URLs must not be empty"));
        }
        if self.serial.message.is_empty() {
            return Err(PipelineError::config("trigger message must not be empty"));
        }
        if self.serial.baud_rate == 0 {
            return Err(PipelineError::config("baud rate must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn valid() -> WorkerConfig {
        WorkerConfig::default().with_store_url("https://demo.firebaseio.com")
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.camera.device, "/dev/video0");
        assert_eq!(config.serial.payload(), b"START\n");
        assert_eq!(config.signal.trigger_path, "parking/car_detected");
        assert_eq!(config.signal.arm, ArmCondition::Equals(serde_json::Value::Bool(true)));
        assert!(!config.loop_config.continuous);
        assert!(config.loop_config.signal_timeout.is_none());
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_bypass_does_not_need_store() {
        let config =
            WorkerConfig::default().with_signal(SignalConfig::default().bypass_default());
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case::no_store(WorkerConfig::default(), "signal store URL")]
    #[case::zero_poll(
        valid().with_signal(SignalConfig::default().poll_interval(Duration::ZERO)),
        "poll interval"
    )]
    #[case::zero_capture_timeout(
        valid().with_camera(CameraConfig::default().timeout(Duration::ZERO)),
        "capture timeout"
    )]
    #[case::empty_message(
        valid().with_serial(SerialConfig::default().message("")),
        "trigger message"
    )]
    fn test_invalid_config(#[case] config: WorkerConfig, #[case] expected: &str) {
        let error = config.validate().unwrap_err();
        assert!(matches!(error, PipelineError::Config(_)));
        assert!(error.to_string().contains(expected), "{error}");
    }
}
