//! Per-cycle state.
//!
//! A [`Cycle`] is an owned value that moves through the pipeline stages:
//!
//! ```text
//! WaitSignal → Capture → Recognize → Match → [Actuate] → Persist → Done
//! ```
//!
//! Every transition consumes the old value and returns the new one, so a
//! cycle can never be observed in a stage it has left. Failures jump to
//! `Persist` from any earlier stage.
//!
//! # Examples
//!
//! ```
//! use parkgate_core::{CycleId, CycleStage};
//! use parkgate_pipeline::Cycle;
//!
//! let cycle = Cycle::new(CycleId::FIRST);
//! let cycle = cycle.enter(CycleStage::Capture).unwrap();
//! assert_eq!(cycle.stage(), CycleStage::Capture);
//!
//! // Skipping stages is rejected
//! assert!(cycle.enter(CycleStage::Actuate).is_err());
//! ```

use chrono::{DateTime, Utc};
use parkgate_core::{CycleId, CycleStage, PipelineError, Result};
use parkgate_storage::StageTiming;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct Cycle {
    id: CycleId,
    started_at: DateTime<Utc>,
    started: Instant,
    stage: CycleStage,
    stage_started_at: DateTime<Utc>,
    stage_started: Instant,
    timings: Vec<StageTiming>,
}

impl Cycle {
    /// Start a cycle in `WaitSignal`.
    pub fn new(id: CycleId) -> Self {
        let now = Utc::now();
        let instant = Instant::now();
        Self {
            id,
            started_at: now,
            started: instant,
            stage: CycleStage::WaitSignal,
            stage_started_at: now,
            stage_started: instant,
            timings: Vec::new(),
        }
    }

    pub fn id(&self) -> CycleId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn stage(&self) -> CycleStage {
        self.stage
    }

    /// Time since the cycle started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Completed stages with their durations, in order.
    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    /// Move to `next`, closing the timing of the current stage.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidStageTransition` if `next` does not
    /// follow the current stage.
    pub fn enter(mut self, next: CycleStage) -> Result<Cycle> {
        if !self.stage.can_transition_to(&next) {
            return Err(PipelineError::InvalidStageTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }

        let duration_ms =
            u64::try_from(self.stage_started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.timings.push(StageTiming {
            stage: self.stage,
            started_at: self.stage_started_at,
            duration_ms,
        });

        trace!(
            cycle_id = %self.id,
            from = %self.stage,
            to = %next,
            duration_ms,
            "Stage transition"
        );

        self.stage = next;
        self.stage_started_at = Utc::now();
        self.stage_started = Instant::now();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cycle_waits_for_signal() {
        let cycle = Cycle::new(CycleId::new(5));
        assert_eq!(cycle.id(), CycleId::new(5));
        assert_eq!(cycle.stage(), CycleStage::WaitSignal);
        assert!(cycle.timings().is_empty());
    }

    #[test]
    fn test_full_path_records_every_stage() {
        let stages = [
            CycleStage::Capture,
            CycleStage::Recognize,
            CycleStage::Match,
            CycleStage::Actuate,
            CycleStage::Persist,
            CycleStage::Done,
        ];

        let cycle = stages
            .iter()
            .try_fold(Cycle::new(CycleId::FIRST), |cycle, stage| cycle.enter(*stage))
            .unwrap();

        let recorded: Vec<CycleStage> = cycle.timings().iter().map(|t| t.stage).collect();
        assert_eq!(
            recorded,
            vec![
                CycleStage::WaitSignal,
                CycleStage::Capture,
                CycleStage::Recognize,
                CycleStage::Match,
                CycleStage::Actuate,
                CycleStage::Persist,
            ]
        );
        assert_eq!(cycle.stage(), CycleStage::Done);
    }

    #[test]
    fn test_failure_jumps_to_persist() {
        let cycle = Cycle::new(CycleId::FIRST)
            .enter(CycleStage::Capture)
            .unwrap()
            .enter(CycleStage::Persist)
            .unwrap();
        assert_eq!(cycle.stage(), CycleStage::Persist);
        assert_eq!(cycle.timings().len(), 2);
    }

    #[test]
    fn test_invalid_transition_error() {
        let result = Cycle::new(CycleId::FIRST).enter(CycleStage::Done);
        let Err(PipelineError::InvalidStageTransition { from, to }) = result else {
            panic!("expected invalid transition");
        };
        assert_eq!(from, "wait-signal");
        assert_eq!(to, "done");
    }
}
