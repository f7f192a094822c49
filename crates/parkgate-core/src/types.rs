use crate::{PipelineError, Result, constants::MAX_PLATE_LENGTH};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized license plate text.
///
/// Normalization removes every whitespace character and uppercases the rest,
/// the same form the reservation service stores plates in, so `"12a 3456"`
/// and `"12A3456"` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlateNumber(String);

impl PlateNumber {
    /// Create a plate from raw recognizer output.
    ///
    /// # Errors
    /// Returns `PipelineError::InvalidPlate` if nothing is left after
    /// normalization or the result exceeds `MAX_PLATE_LENGTH` characters.
    pub fn new(raw: &str) -> Result<Self> {
        let normalized = Self::normalize(raw);

        if normalized.is_empty() {
            return Err(PipelineError::InvalidPlate(
                "plate text is empty".to_string(),
            ));
        }

        let len = normalized.chars().count();
        if len > MAX_PLATE_LENGTH {
            return Err(PipelineError::InvalidPlate(format!(
                "plate must be at most {MAX_PLATE_LENGTH} chars, got {len}"
            )));
        }

        Ok(PlateNumber(normalized))
    }

    /// Strip all whitespace and uppercase.
    #[must_use]
    pub fn normalize(raw: &str) -> String {
        raw.split_whitespace().collect::<String>().to_uppercase()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlateNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PlateNumber {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        PlateNumber::new(s)
    }
}

/// Monotonic cycle counter, starting at 1 for each worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(u64);

impl CycleId {
    pub const FIRST: CycleId = CycleId(1);

    #[must_use]
    pub fn new(id: u64) -> Self {
        CycleId(id)
    }

    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn next(self) -> Self {
        CycleId(self.0.saturating_add(1))
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

/// Pipeline stage a cycle is in.
///
/// Valid transitions:
/// - WaitSignal → Capture → Recognize → Match → Actuate → Persist → Done
/// - Match → Persist (no match, actuation skipped)
/// - any stage before Persist → Persist (stage failure)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleStage {
    WaitSignal,
    Capture,
    Recognize,
    Match,
    Actuate,
    Persist,
    Done,
}

impl CycleStage {
    /// Check if the pipeline may move from this stage to `target`.
    ///
    /// ```
    /// use parkgate_core::CycleStage;
    ///
    /// assert!(CycleStage::Recognize.can_transition_to(&CycleStage::Persist));
    /// assert!(!CycleStage::Recognize.can_transition_to(&CycleStage::Actuate));
    /// ```
    pub fn can_transition_to(&self, target: &CycleStage) -> bool {
        matches!(
            (self, target),
            (CycleStage::WaitSignal, CycleStage::Capture | CycleStage::Persist)
                | (CycleStage::Capture, CycleStage::Recognize | CycleStage::Persist)
                | (CycleStage::Recognize, CycleStage::Match | CycleStage::Persist)
                | (CycleStage::Match, CycleStage::Actuate | CycleStage::Persist)
                | (CycleStage::Actuate, CycleStage::Persist)
                | (CycleStage::Persist, CycleStage::Done)
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStage::WaitSignal => "wait-signal",
            CycleStage::Capture => "capture",
            CycleStage::Recognize => "recognize",
            CycleStage::Match => "match",
            CycleStage::Actuate => "actuate",
            CycleStage::Persist => "persist",
            CycleStage::Done => "done",
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal outcome of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleOutcome {
    /// Plate matched a reservation and the gate was pulsed.
    Matched,
    /// The match service answered that no reservation covers the plate.
    NoMatch,
    SignalTimeout,
    CaptureFailed,
    RecognitionFailed,
    /// The match service could not be asked; no actuation happened.
    MatchCheckFailed,
    /// Plate matched but the gate pulse did not go out.
    ActuationFailed,
    Error,
}

impl CycleOutcome {
    /// Map a stage failure to the outcome it ends the cycle with.
    #[must_use]
    pub fn from_error(error: &PipelineError) -> Self {
        match error {
            PipelineError::SignalTimeout { .. } => CycleOutcome::SignalTimeout,
            PipelineError::CaptureFailed(_) => CycleOutcome::CaptureFailed,
            PipelineError::RecognitionFailed(_) | PipelineError::InvalidPlate(_) => {
                CycleOutcome::RecognitionFailed
            }
            PipelineError::MatchCheckFailed(_) => CycleOutcome::MatchCheckFailed,
            PipelineError::ActuationFailed(_) => CycleOutcome::ActuationFailed,
            _ => CycleOutcome::Error,
        }
    }

    /// Process exit status for single-shot runs.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            CycleOutcome::Matched => 0,
            CycleOutcome::Error => 1,
            CycleOutcome::NoMatch => 2,
            CycleOutcome::SignalTimeout => 3,
            CycleOutcome::CaptureFailed => 4,
            CycleOutcome::RecognitionFailed => 5,
            CycleOutcome::MatchCheckFailed => 6,
            CycleOutcome::ActuationFailed => 7,
        }
    }

    /// Returns `true` if the pipeline ran to a decision (match or no match).
    #[inline]
    #[must_use]
    pub fn is_decision(self) -> bool {
        matches!(self, CycleOutcome::Matched | CycleOutcome::NoMatch)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Matched => "matched",
            CycleOutcome::NoMatch => "no-match",
            CycleOutcome::SignalTimeout => "signal-timeout",
            CycleOutcome::CaptureFailed => "capture-failed",
            CycleOutcome::RecognitionFailed => "recognition-failed",
            CycleOutcome::MatchCheckFailed => "match-check-failed",
            CycleOutcome::ActuationFailed => "actuation-failed",
            CycleOutcome::Error => "error",
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
