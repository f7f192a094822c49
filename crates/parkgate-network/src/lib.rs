//! Remote collaborators of the parking gate worker.
//!
//! - [`signal`]: polls the arrival flag in a Firebase Realtime Database.
//! - [`recognition`]: uploads a frame and reads back the plate.
//! - [`matching`]: asks the reservation backend whether a plate may enter.
//!
//! All three talk HTTP through a [`ServiceTransport`]; [`mock`] has the
//! scripted transport and in-memory store used in tests.

pub mod error;
pub mod matching;
pub mod mock;
pub mod recognition;
pub mod signal;
pub mod transport;

pub use error::{NetworkError, Result};
pub use matching::{MatchClient, MatchConfig, MatchResult};
pub use recognition::{RecognitionClient, RecognitionConfig, RecognitionResult};
pub use signal::{
    ArmCondition, FirebaseSignalStore, SignalConfig, SignalEvent, SignalStore, SignalWaiter,
};
pub use transport::{HttpTransport, ServiceRequest, ServiceResponse, ServiceTransport};
