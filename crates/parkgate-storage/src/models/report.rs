use chrono::{DateTime, Utc};
use parkgate_core::{CycleId, CycleOutcome, CycleStage, PipelineError};
use parkgate_hardware::actuator::ActuationRecord;
use parkgate_hardware::capture::CapturedFrame;
use parkgate_network::{MatchResult, RecognitionResult, SignalEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version of the report document layout.
pub const REPORT_VERSION: u32 = 1;

/// Durable record of one pipeline cycle.
///
/// One report is written per cycle, whichever stage the cycle ended in, and
/// never modified afterwards. Stage sections are `None` for stages the cycle
/// did not reach.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use parkgate_core::{CycleId, CycleOutcome};
/// use parkgate_storage::models::Report;
/// use uuid::Uuid;
///
/// let started = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
/// let report = Report::new(Uuid::nil(), 4242, CycleId::new(3), started, CycleOutcome::NoMatch);
///
/// assert_eq!(report.file_name(), "20240501T083000000Z-c000003-p4242.json");
/// assert!(!report.is_failure());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_version: u32,

    /// Identifies the worker process instance.
    pub instance_id: Uuid,
    pub pid: u32,

    pub cycle_id: CycleId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    pub outcome: CycleOutcome,
    /// Stage that failed; `None` when the cycle reached a decision.
    pub failed_stage: Option<CycleStage>,
    pub error: Option<ErrorDetail>,

    /// Time spent in each stage, in order.
    pub timings: Vec<StageTiming>,

    pub signal: Option<SignalEvent>,
    pub capture: Option<CapturedFrame>,
    pub recognition: Option<RecognitionResult>,
    #[serde(rename = "match")]
    pub match_result: Option<MatchResult>,
    pub actuation: Option<ActuationRecord>,
}

impl Report {
    pub fn new(
        instance_id: Uuid,
        pid: u32,
        cycle_id: CycleId,
        started_at: DateTime<Utc>,
        outcome: CycleOutcome,
    ) -> Self {
        Self {
            report_version: REPORT_VERSION,
            instance_id,
            pid,
            cycle_id,
            started_at,
            finished_at: started_at,
            outcome,
            failed_stage: None,
            error: None,
            timings: Vec::new(),
            signal: None,
            capture: None,
            recognition: None,
            match_result: None,
            actuation: None,
        }
    }

    /// Deterministic file name: `<started_at>-c<cycle>-p<pid>.json`.
    ///
    /// Names sort chronologically, and the cycle id and pid keep workers
    /// sharing a directory from colliding.
    pub fn file_name(&self) -> String {
        format!(
            "{}-c{}-p{}.json",
            self.started_at.format("%Y%m%dT%H%M%S%3fZ"),
            self.cycle_id,
            self.pid
        )
    }

    /// Returns `true` if a stage failed.
    pub fn is_failure(&self) -> bool {
        !self.outcome.is_decision()
    }

    /// Plate recognized in this cycle, if any.
    pub fn plate(&self) -> Option<&str> {
        self.recognition
            .as_ref()
            .and_then(|r| r.plate.as_ref())
            .map(|p| p.as_str())
    }

    pub fn total_ms(&self) -> u64 {
        self.timings.iter().map(|t| t.duration_ms).sum()
    }
}

/// Error recorded for a failed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Kebab-case error kind, e.g. `recognition-failed`.
    pub code: String,
    pub message: String,
}

impl From<&PipelineError> for ErrorDetail {
    fn from(error: &PipelineError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: CycleStage,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}
