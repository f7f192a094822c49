//! The parking gate worker pipeline.
//!
//! One cycle per arrival signal:
//!
//! 1. wait for the arrival signal ([`parkgate_network::SignalWaiter`])
//! 2. capture a frame ([`parkgate_hardware::capture::FrameCapturer`])
//! 3. recognize the plate ([`parkgate_network::RecognitionClient`])
//! 4. check it against reservations ([`parkgate_network::MatchClient`])
//! 5. on a confirmed match, pulse the gate ([`parkgate_hardware::actuator::Actuator`])
//! 6. persist a report ([`parkgate_storage::ReportWriter`])
//!
//! [`CycleController`] drives the stages, either once or continuously until
//! shutdown.

pub mod config;
pub mod controller;
pub mod cycle;

pub use config::WorkerConfig;
pub use controller::{CycleController, CycleReport, Devices, shutdown_requested};
pub use cycle::Cycle;
