use thiserror::Error;

/// Failures a single pipeline cycle can end with.
///
/// Every stage failure is caught by the cycle controller and folded into the
/// cycle's report; none of these escape a cycle as an unhandled fault.
#[derive(Error, Debug)]
pub enum PipelineError {
    // Stage failures
    #[error("No signal within {waited_ms}ms")]
    SignalTimeout { waited_ms: u64 },

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("Match check failed: {0}")]
    MatchCheckFailed(String),

    #[error("Actuation failed: {0}")]
    ActuationFailed(String),

    #[error("Report write failed: {0}")]
    ReportWriteFailed(String),

    // Validation errors
    #[error("Invalid plate: {0}")]
    InvalidPlate(String),

    #[error("Invalid stage transition from {from} to {to}")]
    InvalidStageTransition { from: String, to: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable kebab-case identifier used in reports.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SignalTimeout { .. } => "signal-timeout",
            Self::CaptureFailed(_) => "capture-failed",
            Self::RecognitionFailed(_) => "recognition-failed",
            Self::MatchCheckFailed(_) => "match-check-failed",
            Self::ActuationFailed(_) => "actuation-failed",
            Self::ReportWriteFailed(_) => "report-write-failed",
            Self::InvalidPlate(_) => "invalid-plate",
            Self::InvalidStageTransition { .. } => "invalid-stage-transition",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }

    pub fn capture(message: impl Into<String>) -> Self {
        Self::CaptureFailed(message.into())
    }

    pub fn recognition(message: impl Into<String>) -> Self {
        Self::RecognitionFailed(message.into())
    }

    pub fn match_check(message: impl Into<String>) -> Self {
        Self::MatchCheckFailed(message.into())
    }

    pub fn actuation(message: impl Into<String>) -> Self {
        Self::ActuationFailed(message.into())
    }

    pub fn report_write(message: impl Into<String>) -> Self {
        Self::ReportWriteFailed(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
