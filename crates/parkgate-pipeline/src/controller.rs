//! Cycle controller.
//!
//! Runs the capture → recognize → match → actuate → persist pipeline once
//! per arrival signal. Stage failures never escape a cycle: they end it in
//! `Persist` with the failure recorded, and every cycle that got past the
//! signal wait (or timed out in it) produces exactly one report.

use crate::config::WorkerConfig;
use crate::cycle::Cycle;
use chrono::Utc;
use parkgate_core::{CycleId, CycleOutcome, CycleStage, PipelineError};
use parkgate_hardware::actuator::Actuator;
use parkgate_hardware::capture::{FrameCapturer, frame_path};
use parkgate_hardware::traits::{CameraDevice, SerialConnector};
use parkgate_network::{
    MatchClient, RecognitionClient, ServiceTransport, SignalEvent, SignalStore, SignalWaiter,
};
use parkgate_storage::{ErrorDetail, Report, ReportWriter};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why a cycle stopped before reaching a decision.
#[derive(Debug)]
enum Interrupt {
    Failed(PipelineError),
    /// Shutdown requested while waiting for a signal.
    Shutdown,
}

impl From<PipelineError> for Interrupt {
    fn from(error: PipelineError) -> Self {
        Self::Failed(error)
    }
}

/// Camera and serial connector used by a controller.
#[derive(Debug)]
pub struct Devices<C, S> {
    pub camera: C,
    pub serial: S,
}

/// A finished cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub report: Report,
    /// Where the report was written; `None` if writing failed.
    pub path: Option<PathBuf>,
}

impl CycleReport {
    pub fn outcome(&self) -> CycleOutcome {
        self.report.outcome
    }
}

/// Drives cycles against one set of collaborators.
pub struct CycleController<C, S, T, St> {
    waiter: SignalWaiter<St>,
    capturer: FrameCapturer<C>,
    recognizer: RecognitionClient<T>,
    matcher: MatchClient<T>,
    actuator: Actuator<S>,
    writer: ReportWriter,
    config: WorkerConfig,
    next_cycle: CycleId,
    instance_id: Uuid,
    pid: u32,
}

impl<C, S, T, St> CycleController<C, S, T, St>
where
    C: CameraDevice,
    S: SerialConnector,
    T: ServiceTransport + Clone,
    St: SignalStore,
{
    pub fn new(config: WorkerConfig, devices: Devices<C, S>, transport: T, store: St) -> Self {
        let instance_id = Uuid::new_v4();
        debug!(%instance_id, "Creating cycle controller");

        Self {
            waiter: SignalWaiter::new(store, config.signal.clone()),
            capturer: FrameCapturer::new(devices.camera, config.camera.timeout),
            recognizer: RecognitionClient::new(
                transport.clone(),
                config.services.recognition.clone(),
            ),
            matcher: MatchClient::new(transport, config.services.matching.clone()),
            actuator: Actuator::new(devices.serial, config.serial.clone()),
            writer: ReportWriter::new(&config.report.dir),
            config,
            next_cycle: CycleId::FIRST,
            instance_id,
            pid: std::process::id(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run a single cycle.
    ///
    /// Returns `None` only if shutdown was requested before a signal
    /// arrived; no report is written in that case.
    pub async fn run_once(&mut self, shutdown: &mut watch::Receiver<bool>) -> Option<CycleReport> {
        self.run_cycle(shutdown).await
    }

    /// Run cycles until shutdown, pausing `interval` between them.
    ///
    /// Returns the number of completed cycles.
    pub async fn run_continuous(&mut self, shutdown: &mut watch::Receiver<bool>) -> u64 {
        let interval = self.config.loop_config.interval;
        let mut completed = 0u64;

        info!(
            instance_id = %self.instance_id,
            interval_ms = interval.as_millis() as u64,
            "Continuous mode started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_cycle(shutdown).await {
                Some(_) => completed += 1,
                None => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_requested(shutdown) => break,
            }
        }

        info!(completed, "Continuous mode stopped");
        completed
    }

    /// Run one full cycle and persist its report.
    pub async fn run_cycle(&mut self, shutdown: &mut watch::Receiver<bool>) -> Option<CycleReport> {
        let id = self.next_cycle;
        self.next_cycle = id.next();

        let mut cycle = Cycle::new(id);
        let mut report = Report::new(
            self.instance_id,
            self.pid,
            id,
            cycle.started_at(),
            CycleOutcome::Error,
        );

        info!(cycle_id = %id, "Cycle started");

        let outcome = match self.run_stages(&mut cycle, &mut report, shutdown).await {
            Ok(outcome) => outcome,
            Err(Interrupt::Shutdown) => {
                info!(cycle_id = %id, "Shutdown while waiting for signal");
                return None;
            }
            Err(Interrupt::Failed(e)) => {
                error!(cycle_id = %id, stage = %cycle.stage(), error = %e, "Stage failed");
                report.failed_stage = Some(cycle.stage());
                report.error = Some(ErrorDetail::from(&e));
                CycleOutcome::from_error(&e)
            }
        };
        report.outcome = outcome;

        if let Err(e) = advance(&mut cycle, CycleStage::Persist) {
            warn!(cycle_id = %id, error = %e, "Cannot enter persist stage");
        }
        report.timings = cycle.timings().to_vec();
        report.finished_at = Utc::now();

        let path = match self.writer.write(&report).await {
            Ok(path) => Some(path),
            Err(e) => {
                let e = PipelineError::report_write(e.to_string());
                error!(cycle_id = %id, error = %e, "Report not persisted");
                None
            }
        };

        if let Err(e) = advance(&mut cycle, CycleStage::Done) {
            warn!(cycle_id = %id, error = %e, "Cannot finish cycle");
        }

        info!(
            cycle_id = %id,
            outcome = %outcome,
            plate = report.plate().unwrap_or("-"),
            elapsed_ms = cycle.elapsed().as_millis() as u64,
            "Cycle finished"
        );

        Some(CycleReport { report, path })
    }

    async fn run_stages(
        &mut self,
        cycle: &mut Cycle,
        report: &mut Report,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<CycleOutcome, Interrupt> {
        let event = self.wait_for_signal(cycle.id(), shutdown).await?;
        report.signal = Some(event);

        advance(cycle, CycleStage::Capture)?;
        let output = frame_path(&self.config.camera.capture_dir, Utc::now(), cycle.id());
        let frame = self
            .capturer
            .capture(&self.config.camera.device, &output)
            .await
            .map_err(|e| PipelineError::capture(e.to_string()))?;
        report.capture = Some(frame.clone());

        advance(cycle, CycleStage::Recognize)?;
        let recognition = self.recognizer.recognize(&frame.path).await;
        let plate = recognition.plate.clone();
        let failure = recognition.error.clone();
        report.recognition = Some(recognition);
        let plate = plate.ok_or_else(|| {
            PipelineError::recognition(failure.unwrap_or_else(|| "no plate".to_string()))
        })?;

        advance(cycle, CycleStage::Match)?;
        let result = self.matcher.check_match(&plate, frame.captured_at).await;
        let allows_entry = result.allows_entry();
        let failure = result.failure.clone();
        report.match_result = Some(result);

        if let Some(failure) = failure {
            return Err(PipelineError::match_check(failure).into());
        }
        if !allows_entry {
            info!(cycle_id = %cycle.id(), plate = %plate, "No reservation; gate stays closed");
            return Ok(CycleOutcome::NoMatch);
        }

        advance(cycle, CycleStage::Actuate)?;
        let record = self.actuator.actuate().await;
        let failure = record.error.clone();
        report.actuation = Some(record);

        match failure {
            Some(failure) => Err(PipelineError::actuation(failure).into()),
            None => Ok(CycleOutcome::Matched),
        }
    }

    async fn wait_for_signal(
        &mut self,
        cycle: CycleId,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SignalEvent, Interrupt> {
        let timeout = self.config.loop_config.signal_timeout;

        tokio::select! {
            result = self.waiter.wait_for_signal(cycle, timeout) => {
                result.map_err(Interrupt::Failed)
            }
            _ = shutdown_requested(shutdown) => Err(Interrupt::Shutdown),
        }
    }
}

/// Replace `cycle` with its successor in `next`.
fn advance(cycle: &mut Cycle, next: CycleStage) -> parkgate_core::Result<()> {
    *cycle = cycle.clone().enter(next)?;
    Ok(())
}

/// Resolves once shutdown is requested. Never resolves if the sender is gone.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
