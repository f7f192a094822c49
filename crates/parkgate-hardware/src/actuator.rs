//! Gate actuation over a serial line.
//!
//! The gate controller starts its cycle on receipt of any byte. One actuation
//! walks this state machine:
//!
//! ```text
//! Idle → Connecting → [AwaitingReady] → Sending → Closed
//! ```
//!
//! Any state may jump straight to `Closed` on failure. The port is released
//! before `Closed` is recorded, on every path.

use crate::error::{HardwareError, Result};
use crate::traits::{SerialConnector, SerialLink};
use crate::types::SerialSettings;
use chrono::{DateTime, Utc};
use parkgate_core::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_SERIAL_PORT, DEFAULT_SERIAL_TIMEOUT_MS, DEFAULT_SERIAL_WAIT_MS,
    DEFAULT_TRIGGER_MESSAGE,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Actuator lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActuatorState {
    Idle,
    Connecting,
    AwaitingReady,
    Sending,
    Closed,
}

impl ActuatorState {
    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: &ActuatorState) -> bool {
        matches!(
            (self, target),
            (ActuatorState::Idle, ActuatorState::Connecting)
                | (ActuatorState::Connecting, ActuatorState::AwaitingReady)
                | (ActuatorState::Connecting, ActuatorState::Sending)
                | (ActuatorState::AwaitingReady, ActuatorState::Sending)
                | (
                    ActuatorState::Idle
                        | ActuatorState::Connecting
                        | ActuatorState::AwaitingReady
                        | ActuatorState::Sending,
                    ActuatorState::Closed
                )
        )
    }
}

/// Serial line settings for the gate controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Trigger message. Any non-empty payload starts the gate.
    pub message: String,
    /// Append `\n` to the message.
    pub newline: bool,
    /// Wait up to this long for the board after opening the port.
    pub wait: Option<Duration>,
    /// Upper bound for opening the port and for writing the message.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            message: DEFAULT_TRIGGER_MESSAGE.to_string(),
            newline: true,
            wait: Some(Duration::from_millis(DEFAULT_SERIAL_WAIT_MS)),
            timeout: Duration::from_millis(DEFAULT_SERIAL_TIMEOUT_MS),
        }
    }
}

impl SerialConfig {
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn newline(mut self, newline: bool) -> Self {
        self.newline = newline;
        self
    }

    pub fn wait(mut self, wait: Option<Duration>) -> Self {
        self.wait = wait;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bytes written to the port.
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = self.message.as_bytes().to_vec();
        if self.newline {
            payload.push(b'\n');
        }
        payload
    }
}

/// What one actuation did. Always produced, also on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuationRecord {
    pub port: String,
    pub baud_rate: u32,
    /// Payload as text, e.g. `"START\n"`.
    pub message: String,
    pub bytes_sent: usize,
    /// Whether the board sent a byte during the ready wait; `None` if no
    /// wait was configured or the wait failed.
    pub ready_byte: Option<bool>,
    /// States visited, starting with `Idle` and ending with `Closed`.
    pub states: Vec<ActuatorState>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl ActuationRecord {
    fn start(config: &SerialConfig, payload: &[u8]) -> Self {
        Self {
            port: config.port.clone(),
            baud_rate: config.baud_rate,
            message: String::from_utf8_lossy(payload).into_owned(),
            bytes_sent: 0,
            ready_byte: None,
            states: vec![ActuatorState::Idle],
            started_at: Utc::now(),
            elapsed_ms: 0,
            error: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ActuatorState {
        self.states.last().copied().unwrap_or(ActuatorState::Idle)
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.bytes_sent > 0
    }

    fn enter(&mut self, next: ActuatorState) {
        let current = self.state();
        debug_assert!(
            current.can_transition_to(&next),
            "invalid actuator transition {current:?} -> {next:?}"
        );
        debug!(port = %self.port, from = ?current, to = ?next, "Actuator transition");
        self.states.push(next);
    }
}

/// Pulses the gate controller.
#[derive(Debug, Clone)]
pub struct Actuator<S> {
    connector: S,
    config: SerialConfig,
}

impl<S: SerialConnector> Actuator<S> {
    pub fn new(connector: S, config: SerialConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Open the port, optionally wait for the board, send the trigger
    /// message and close the port.
    ///
    /// Failures are recorded in the returned [`ActuationRecord`] rather than
    /// returned; the port is closed in every case.
    pub async fn actuate(&self) -> ActuationRecord {
        let payload = self.config.payload();
        let mut record = ActuationRecord::start(&self.config, &payload);
        let started = Instant::now();

        if payload.is_empty() {
            record.error = Some("trigger message is empty".to_string());
        } else if let Err(e) = self.drive(&payload, &mut record).await {
            error!(port = %self.config.port, error = %e, "Actuation failed");
            record.error = Some(e.to_string());
        }

        record.enter(ActuatorState::Closed);
        record.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if record.succeeded() {
            info!(
                port = %record.port,
                bytes = record.bytes_sent,
                elapsed_ms = record.elapsed_ms,
                "Gate triggered"
            );
        }

        record
    }

    async fn drive(&self, payload: &[u8], record: &mut ActuationRecord) -> Result<()> {
        let timeout = self.config.timeout;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let settings =
            SerialSettings::new(&self.config.port, self.config.baud_rate).with_timeout(timeout);

        record.enter(ActuatorState::Connecting);
        let mut link = tokio::time::timeout(timeout, self.connector.open(&settings))
            .await
            .map_err(|_| HardwareError::timeout(timeout_ms))??;

        if let Some(wait) = self.config.wait {
            record.enter(ActuatorState::AwaitingReady);
            match link.wait_ready(wait).await {
                Ok(ready) => {
                    debug!(port = %self.config.port, ready, "Ready wait finished");
                    record.ready_byte = Some(ready);
                }
                Err(e) => warn!(port = %self.config.port, error = %e, "Ready wait failed"),
            }
        }

        record.enter(ActuatorState::Sending);
        match tokio::time::timeout(timeout, link.send(payload)).await {
            Ok(Ok(())) => {
                record.bytes_sent = payload.len();
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(HardwareError::timeout(timeout_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockSerialConnector, WriteBehavior};
    use rstest::rstest;

    fn config() -> SerialConfig {
        SerialConfig::default()
            .wait(None)
            .timeout(Duration::from_millis(200))
    }

    #[rstest]
    #[case(ActuatorState::Idle, ActuatorState::Connecting, true)]
    #[case(ActuatorState::Connecting, ActuatorState::AwaitingReady, true)]
    #[case(ActuatorState::Connecting, ActuatorState::Sending, true)]
    #[case(ActuatorState::AwaitingReady, ActuatorState::Sending, true)]
    #[case(ActuatorState::Sending, ActuatorState::Closed, true)]
    #[case(ActuatorState::Idle, ActuatorState::Closed, true)]
    #[case(ActuatorState::Idle, ActuatorState::Sending, false)]
    #[case(ActuatorState::Closed, ActuatorState::Connecting, false)]
    #[case(ActuatorState::Sending, ActuatorState::AwaitingReady, false)]
    fn test_state_transitions(
        #[case] from: ActuatorState,
        #[case] to: ActuatorState,
        #[case] valid: bool,
    ) {
        assert_eq!(from.can_transition_to(&to), valid);
    }

    #[test]
    fn test_payload() {
        assert_eq!(SerialConfig::default().payload(), b"START\n");
        assert_eq!(
            SerialConfig::default().message("GO").newline(false).payload(),
            b"GO"
        );
    }

    #[tokio::test]
    async fn test_actuate_sends_message() {
        let (connector, handle) = MockSerialConnector::new();
        let actuator = Actuator::new(connector, config());

        let record = actuator.actuate().await;

        assert!(record.succeeded());
        assert_eq!(record.message, "START\n");
        assert_eq!(record.bytes_sent, 6);
        assert_eq!(
            record.states,
            vec![
                ActuatorState::Idle,
                ActuatorState::Connecting,
                ActuatorState::Sending,
                ActuatorState::Closed
            ]
        );
        assert_eq!(handle.writes(), vec![b"START\n".to_vec()]);
        assert_eq!(handle.open_count(), 1);
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_actuate_waits_for_board() {
        let (connector, handle) = MockSerialConnector::new();
        let actuator = Actuator::new(
            connector,
            config().wait(Some(Duration::from_secs(2))),
        );

        let record = actuator.actuate().await;

        assert!(record.succeeded());
        assert_eq!(record.ready_byte, Some(false));
        assert!(record.states.contains(&ActuatorState::AwaitingReady));
        assert_eq!(handle.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_closes_port() {
        let (connector, handle) = MockSerialConnector::new();
        handle.set_write_behavior(WriteBehavior::Hang);
        let actuator = Actuator::new(connector, config());

        let record = actuator.actuate().await;

        assert!(!record.succeeded());
        assert_eq!(record.error.as_deref(), Some("Operation timeout after 200ms"));
        assert_eq!(record.state(), ActuatorState::Closed);
        assert_eq!(handle.open_count(), 1);
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test]
    async fn test_open_failure() {
        let (connector, handle) = MockSerialConnector::new();
        handle.fail_next_open("no such file");
        let actuator = Actuator::new(connector, config());

        let record = actuator.actuate().await;

        assert!(!record.succeeded());
        assert_eq!(
            record.states,
            vec![
                ActuatorState::Idle,
                ActuatorState::Connecting,
                ActuatorState::Closed
            ]
        );
        assert_eq!(handle.open_count(), handle.close_count());
        assert!(handle.writes().is_empty());
    }
}
