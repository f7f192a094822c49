//! Command line surface of the `parkgate` binary.
//!
//! Every flag can also be set through a `PARKGATE_*` environment variable,
//! and a `.env` file in the working directory is loaded before parsing.

use clap::{Args, Parser, Subcommand};
use parkgate_core::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_CAMERA_DEVICE, DEFAULT_CAMERA_INPUT_FORMAT, DEFAULT_CAPTURE_DIR,
    DEFAULT_CAPTURE_TIMEOUT_MS, DEFAULT_CYCLE_INTERVAL_MS, DEFAULT_MATCH_TIMEOUT_MS,
    DEFAULT_MATCH_URL, DEFAULT_MOCK_SIGNAL, DEFAULT_PLATE_FIELD, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RECOGNITION_TIMEOUT_MS, DEFAULT_RECOGNITION_URL, DEFAULT_REPORT_DIR,
    DEFAULT_SERIAL_PORT, DEFAULT_SERIAL_TIMEOUT_MS, DEFAULT_SERIAL_WAIT_MS,
    DEFAULT_TRIGGER_MESSAGE, DEFAULT_TRIGGER_PATH, DEFAULT_UPLOAD_FIELD,
};
use parkgate_network::{MatchConfig, RecognitionConfig};
use parkgate_pipeline::WorkerConfig;
use parkgate_pipeline::config::{
    ArmCondition, CameraConfig, LoopConfig, SerialConfig, ServiceConfig, SignalConfig,
};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "parkgate", version, about = "Parking gate worker")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arguments of `run` when no subcommand is given.
    #[command(flatten)]
    pub run: RunArgs,
}

impl Cli {
    /// The command to execute; `run` when none was given.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Run(self.run))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wait for arrivals and run the gate pipeline (default).
    Run(RunArgs),
    /// Pulse the gate for the most recent reported cycle.
    Release(ReleaseArgs),
}

impl Command {
    pub fn log_level(&self) -> &str {
        match self {
            Command::Run(args) => &args.common.log_level,
            Command::Release(args) => &args.common.log_level,
        }
    }
}

/// Flags shared by every command.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "PARKGATE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Directory receiving one JSON report per cycle
    #[arg(long, env = "PARKGATE_REPORT_DIR", default_value = DEFAULT_REPORT_DIR)]
    pub report_dir: PathBuf,

    /// Use the mock camera and serial port instead of real hardware
    #[arg(long, env = "PARKGATE_SIMULATE")]
    pub simulate: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SerialArgs {
    /// Serial port of the gate controller
    #[arg(long, env = "PARKGATE_SERIAL_PORT", default_value = DEFAULT_SERIAL_PORT)]
    pub serial_port: String,

    #[arg(long, env = "PARKGATE_SERIAL_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    pub serial_baud: u32,

    /// Trigger message sent to the controller
    #[arg(long, env = "PARKGATE_SERIAL_MESSAGE", default_value = DEFAULT_TRIGGER_MESSAGE)]
    pub serial_message: String,

    /// Send the message without a trailing newline
    #[arg(long, env = "PARKGATE_SERIAL_NO_NEWLINE")]
    pub serial_no_newline: bool,

    /// Wait this long for the board after opening the port; 0 disables
    #[arg(long, env = "PARKGATE_SERIAL_WAIT_MS", default_value_t = DEFAULT_SERIAL_WAIT_MS)]
    pub serial_wait_ms: u64,

    /// Upper bound for opening the port and for the write
    #[arg(long, env = "PARKGATE_SERIAL_TIMEOUT_MS", default_value_t = DEFAULT_SERIAL_TIMEOUT_MS)]
    pub serial_timeout_ms: u64,
}

impl SerialArgs {
    pub fn to_serial_config(&self) -> SerialConfig {
        let wait = (self.serial_wait_ms > 0).then(|| Duration::from_millis(self.serial_wait_ms));

        SerialConfig::default()
            .port(&self.serial_port)
            .baud_rate(self.serial_baud)
            .message(&self.serial_message)
            .newline(!self.serial_no_newline)
            .wait(wait)
            .timeout(Duration::from_millis(self.serial_timeout_ms))
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    // Signal store
    /// Base URL of the Firebase Realtime Database
    #[arg(long, env = "PARKGATE_SIGNAL_URL")]
    pub signal_url: Option<String>,

    /// Database auth token, sent as `?auth=`
    #[arg(long, env = "PARKGATE_SIGNAL_AUTH", hide_env_values = true)]
    pub signal_auth: Option<String>,

    /// Path polled for arrivals
    #[arg(long, env = "PARKGATE_TRIGGER_PATH", default_value = DEFAULT_TRIGGER_PATH)]
    pub trigger_path: String,

    /// Path receiving an acknowledgement per consumed signal
    #[arg(long, env = "PARKGATE_ACK_PATH")]
    pub ack_path: Option<String>,

    /// Value written back to the trigger path after a signal is consumed
    #[arg(long, env = "PARKGATE_RESET_VALUE", value_parser = parse_value)]
    pub reset_value: Option<Value>,

    /// Trigger value that counts as an arrival
    #[arg(long, env = "PARKGATE_ARM_VALUE", value_parser = parse_value, default_value = "true")]
    pub arm_value: Value,

    /// Fire on any new non-null value instead of a fixed one
    #[arg(long, env = "PARKGATE_ARM_CHANGED", conflicts_with = "arm_value")]
    pub arm_changed: bool,

    #[arg(long, env = "PARKGATE_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Give up waiting for a signal after this long; waits forever if unset
    #[arg(long, env = "PARKGATE_SIGNAL_TIMEOUT_MS")]
    pub signal_timeout_ms: Option<u64>,

    /// Do not poll the store; start the cycle immediately
    #[arg(long, env = "PARKGATE_SKIP_SIGNAL")]
    pub skip_signal: bool,

    /// Signal value recorded when the store is skipped
    #[arg(
        long,
        env = "PARKGATE_MOCK_SIGNAL",
        value_parser = parse_value,
        default_value = DEFAULT_MOCK_SIGNAL
    )]
    pub mock_signal: Value,

    // Camera
    #[arg(long, env = "PARKGATE_CAMERA_DEVICE", default_value = DEFAULT_CAMERA_DEVICE)]
    pub camera_device: String,

    /// ffmpeg input format of the capture device
    #[arg(long, env = "PARKGATE_CAMERA_FORMAT", default_value = DEFAULT_CAMERA_INPUT_FORMAT)]
    pub camera_format: String,

    #[arg(long, env = "PARKGATE_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: String,

    #[arg(long, env = "PARKGATE_CAPTURE_TIMEOUT_MS", default_value_t = DEFAULT_CAPTURE_TIMEOUT_MS)]
    pub capture_timeout_ms: u64,

    /// Directory receiving captured frames
    #[arg(long, env = "PARKGATE_CAPTURE_DIR", default_value = DEFAULT_CAPTURE_DIR)]
    pub capture_dir: PathBuf,

    // Services
    #[arg(long, env = "PARKGATE_RECOGNITION_URL", default_value = DEFAULT_RECOGNITION_URL)]
    pub recognition_url: String,

    #[arg(
        long,
        env = "PARKGATE_RECOGNITION_TIMEOUT_MS",
        default_value_t = DEFAULT_RECOGNITION_TIMEOUT_MS
    )]
    pub recognition_timeout_ms: u64,

    /// Multipart field carrying the image
    #[arg(long, env = "PARKGATE_UPLOAD_FIELD", default_value = DEFAULT_UPLOAD_FIELD)]
    pub upload_field: String,

    /// Response field holding the plate text
    #[arg(long, env = "PARKGATE_PLATE_FIELD", default_value = DEFAULT_PLATE_FIELD)]
    pub plate_field: String,

    #[arg(long, env = "PARKGATE_MATCH_URL", default_value = DEFAULT_MATCH_URL)]
    pub match_url: String,

    #[arg(long, env = "PARKGATE_MATCH_TIMEOUT_MS", default_value_t = DEFAULT_MATCH_TIMEOUT_MS)]
    pub match_timeout_ms: u64,

    // Serial
    #[command(flatten)]
    pub serial: SerialArgs,

    // Loop
    /// Keep running cycles until interrupted
    #[arg(long, env = "PARKGATE_CONTINUOUS")]
    pub continuous: bool,

    /// Pause between cycles in continuous mode
    #[arg(long, env = "PARKGATE_CYCLE_INTERVAL_MS", default_value_t = DEFAULT_CYCLE_INTERVAL_MS)]
    pub cycle_interval_ms: u64,
}

impl RunArgs {
    pub fn to_worker_config(&self) -> WorkerConfig {
        let arm = if self.arm_changed {
            ArmCondition::Changed
        } else {
            ArmCondition::Equals(self.arm_value.clone())
        };

        let signal = SignalConfig::default()
            .trigger_path(&self.trigger_path)
            .ack_path(self.ack_path.clone())
            .reset_value(self.reset_value.clone())
            .arm(arm)
            .poll_interval(Duration::from_millis(self.poll_interval_ms))
            .bypass(self.skip_signal.then(|| self.mock_signal.clone()));

        let mut camera = CameraConfig::default()
            .device(&self.camera_device)
            .timeout(Duration::from_millis(self.capture_timeout_ms))
            .capture_dir(&self.capture_dir);
        camera.input_format = self.camera_format.clone();
        camera.ffmpeg_binary = self.ffmpeg.clone();

        let services = ServiceConfig {
            recognition: RecognitionConfig::default()
                .url(&self.recognition_url)
                .timeout(Duration::from_millis(self.recognition_timeout_ms))
                .upload_field(&self.upload_field)
                .plate_field(&self.plate_field),
            matching: MatchConfig::default()
                .url(&self.match_url)
                .timeout(Duration::from_millis(self.match_timeout_ms)),
        };

        let loop_config = LoopConfig::default()
            .continuous(self.continuous)
            .interval(Duration::from_millis(self.cycle_interval_ms))
            .signal_timeout(self.signal_timeout_ms.map(Duration::from_millis));

        let mut config = WorkerConfig::default()
            .with_signal(signal)
            .with_camera(camera)
            .with_services(services)
            .with_serial(self.serial.to_serial_config())
            .with_report_dir(&self.common.report_dir)
            .with_loop(loop_config)
            .with_simulate(self.common.simulate);
        config.store.base_url = self.signal_url.clone();
        config.store.auth_token = self.signal_auth.clone();
        config
    }
}

#[derive(Args, Debug, Clone)]
pub struct ReleaseArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Pulse the gate whatever the latest report says
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub serial: SerialArgs,
}

/// Parse a flag as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Result<Value, String> {
    Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
}
