//! `parkgate`: the parking gate worker.
//!
//! ```text
//! parkgate [run] [FLAGS]        wait for an arrival and run the pipeline
//! parkgate release [--force]    pulse the gate for the latest matched cycle
//! ```

mod cli;

use anyhow::{Context, bail};
use clap::Parser;
use cli::{Cli, Command, ReleaseArgs, RunArgs};
use parkgate_core::CycleOutcome;
use parkgate_hardware::actuator::Actuator;
use parkgate_hardware::camera::FfmpegCamera;
use parkgate_hardware::devices::{AnyCameraDevice, AnySerialConnector};
use parkgate_hardware::mock::{MockCamera, MockSerialConnector};
use parkgate_hardware::serial::SerialPortConnector;
use parkgate_network::{FirebaseSignalStore, HttpTransport};
use parkgate_pipeline::config::CameraConfig;
use parkgate_pipeline::{CycleController, Devices};
use parkgate_storage::{Report, ReportWriter, StorageResult};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status when interrupted before a signal arrived.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; real environment variables still apply.
    let dotenv = dotenvy::dotenv();

    let command = Cli::parse().into_command();
    init_tracing(command.log_level());

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    let result = match command {
        Command::Run(args) => run(args).await,
        Command::Release(args) => release(args).await,
    };

    result.unwrap_or_else(|e| {
        error!("parkgate failed: {e:#}");
        ExitCode::from(exit_status(CycleOutcome::Error))
    })
}

/// `RUST_LOG` wins over `--log-level`.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn exit_status(outcome: CycleOutcome) -> u8 {
    u8::try_from(outcome.exit_code()).unwrap_or(1)
}

async fn run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let config = args.to_worker_config();
    config.validate().context("invalid configuration")?;

    let transport = HttpTransport::new().context("cannot create HTTP client")?;

    // Never read when the signal is bypassed.
    let base_url = config.store.base_url.clone().unwrap_or_default();
    let mut store =
        FirebaseSignalStore::new(transport.clone(), base_url).with_timeout(config.store.timeout);
    if let Some(token) = &config.store.auth_token {
        store = store.with_auth_token(token);
    }

    let devices = Devices {
        camera: camera_device(&config.camera, config.simulate),
        serial: serial_connector(config.simulate),
    };

    info!(
        camera = devices.camera.kind(),
        simulate = config.simulate,
        continuous = config.loop_config.continuous,
        bypass = config.signal.bypass.is_some(),
        reports = %config.report.dir.display(),
        "Starting parkgate worker"
    );

    let continuous = config.loop_config.continuous;
    let mut controller = CycleController::new(config, devices, transport, store);
    info!(instance_id = %controller.instance_id(), "Worker ready");
    let mut shutdown = shutdown_channel();

    if continuous {
        let completed = controller.run_continuous(&mut shutdown).await;
        info!(completed, "Worker stopped");
        return Ok(ExitCode::SUCCESS);
    }

    match controller.run_once(&mut shutdown).await {
        Some(cycle) => {
            if let Some(path) = &cycle.path {
                println!("{}", path.display());
            }
            Ok(ExitCode::from(exit_status(cycle.outcome())))
        }
        None => {
            warn!("Interrupted before a signal arrived");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
    }
}

async fn release(args: ReleaseArgs) -> anyhow::Result<ExitCode> {
    let writer = ReportWriter::new(&args.common.report_dir);
    check_release(writer.latest().await, writer.dir(), args.force)?;

    let actuator = Actuator::new(
        serial_connector(args.common.simulate),
        args.serial.to_serial_config(),
    );
    let record = actuator.actuate().await;
    println!("{}", serde_json::to_string_pretty(&record)?);

    if record.succeeded() {
        info!(port = %record.port, "Gate released");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(exit_status(CycleOutcome::ActuationFailed)))
    }
}

/// Decide whether `release` may pulse the gate given the latest report.
///
/// Only `matched` and `actuation-failed` cycles are released unless
/// `force` is set, which also gets past a missing or unreadable report.
fn check_release(
    latest: StorageResult<Option<(PathBuf, Report)>>,
    dir: &Path,
    force: bool,
) -> anyhow::Result<()> {
    let latest = match latest {
        Ok(latest) => latest,
        Err(e) if force => {
            warn!(dir = %dir.display(), error = %e, "Latest report unreadable; forcing release");
            return Ok(());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("cannot read reports in {}", dir.display()));
        }
    };

    let Some((path, report)) = latest else {
        if force {
            warn!(dir = %dir.display(), "No reports; forcing release");
            return Ok(());
        }
        bail!("no reports in {}", dir.display());
    };

    info!(
        report = %path.display(),
        cycle_id = %report.cycle_id,
        outcome = %report.outcome,
        plate = report.plate().unwrap_or("-"),
        total_ms = report.total_ms(),
        "Latest report"
    );

    let releasable = matches!(
        report.outcome,
        CycleOutcome::Matched | CycleOutcome::ActuationFailed
    );
    if !releasable && !force {
        bail!(
            "latest cycle ended {}; use --force to release anyway",
            report.outcome
        );
    }
    Ok(())
}

fn camera_device(config: &CameraConfig, simulate: bool) -> AnyCameraDevice {
    if simulate {
        AnyCameraDevice::Mock(MockCamera::default())
    } else {
        AnyCameraDevice::Ffmpeg(
            FfmpegCamera::new()
                .with_binary(&config.ffmpeg_binary)
                .with_input_format(&config.input_format),
        )
    }
}

fn serial_connector(simulate: bool) -> AnySerialConnector {
    if simulate {
        AnySerialConnector::Mock(MockSerialConnector::default())
    } else {
        AnySerialConnector::Port(SerialPortConnector::new())
    }
}

/// Receiver flipped to `true` on Ctrl-C or SIGTERM.
fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        termination().await;
        info!("Shutdown requested");
        let _ = tx.send(true);
    });

    rx
}

#[cfg(unix)]
async fn termination() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn termination() {
    let _ = tokio::signal::ctrl_c().await;
}
