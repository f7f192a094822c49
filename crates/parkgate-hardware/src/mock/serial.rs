//! Mock serial connector recording every open, write and close.

use crate::error::{HardwareError, Result};
use crate::traits::{SerialConnector, SerialLink};
use crate::types::SerialSettings;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// How a [`MockSerialLink`] reacts to writes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WriteBehavior {
    /// Accept and record the bytes.
    #[default]
    Accept,

    /// Fail with a communication error.
    Fail(String),

    /// Never complete; the caller's timeout has to fire.
    Hang,
}

#[derive(Debug, Default)]
struct State {
    opens: usize,
    closes: usize,
    open_failure: Option<String>,
    write_behavior: WriteBehavior,
    ready_byte: bool,
    writes: Vec<Vec<u8>>,
    settings: Vec<SerialSettings>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock serial connector.
///
/// # Examples
///
/// ```
/// use parkgate_hardware::mock::MockSerialConnector;
/// use parkgate_hardware::traits::{SerialConnector, SerialLink};
/// use parkgate_hardware::types::SerialSettings;
///
/// #[tokio::main]
/// async fn main() -> parkgate_hardware::Result<()> {
///     let (connector, handle) = MockSerialConnector::new();
///
///     {
///         let mut link = connector.open(&SerialSettings::new("/dev/ttyACM0", 9600)).await?;
///         link.send(b"START\n").await?;
///     }
///
///     assert_eq!(handle.writes(), vec![b"START\n".to_vec()]);
///     assert_eq!(handle.open_count(), handle.close_count());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockSerialConnector {
    state: Arc<Mutex<State>>,
}

impl MockSerialConnector {
    /// Create a new mock connector and its control handle.
    pub fn new() -> (Self, MockSerialHandle) {
        let state = Arc::new(Mutex::new(State::default()));
        let connector = Self {
            state: Arc::clone(&state),
        };
        (connector, MockSerialHandle { state })
    }
}

impl Default for MockSerialConnector {
    fn default() -> Self {
        Self::new().0
    }
}

impl SerialConnector for MockSerialConnector {
    type Link = MockSerialLink;

    async fn open(&self, settings: &SerialSettings) -> Result<MockSerialLink> {
        let mut state = lock(&self.state);
        state.settings.push(settings.clone());

        if let Some(message) = state.open_failure.take() {
            return Err(HardwareError::open_failed(format!("{}: {message}", settings.port)));
        }

        state.opens += 1;
        debug!(port = %settings.port, "Mock serial port opened");

        Ok(MockSerialLink {
            state: Arc::clone(&self.state),
            port: settings.port.clone(),
        })
    }
}

/// Link handed out by [`MockSerialConnector`]. Counts a close on drop.
#[derive(Debug)]
pub struct MockSerialLink {
    state: Arc<Mutex<State>>,
    port: String,
}

impl SerialLink for MockSerialLink {
    async fn wait_ready(&mut self, wait: Duration) -> Result<bool> {
        let ready = lock(&self.state).ready_byte;
        if !ready {
            tokio::time::sleep(wait).await;
        }
        Ok(ready)
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let behavior = lock(&self.state).write_behavior.clone();

        match behavior {
            WriteBehavior::Accept => {
                lock(&self.state).writes.push(data.to_vec());
                Ok(())
            }
            WriteBehavior::Fail(message) => Err(HardwareError::communication(message)),
            WriteBehavior::Hang => std::future::pending().await,
        }
    }
}

impl Drop for MockSerialLink {
    fn drop(&mut self) {
        lock(&self.state).closes += 1;
        debug!(port = %self.port, "Mock serial port closed");
    }
}

/// Handle for scripting and inspecting a [`MockSerialConnector`].
#[derive(Debug, Clone)]
pub struct MockSerialHandle {
    state: Arc<Mutex<State>>,
}

impl MockSerialHandle {
    /// Make the next open fail with `message`.
    pub fn fail_next_open(&self, message: impl Into<String>) {
        lock(&self.state).open_failure = Some(message.into());
    }

    /// Set how writes behave from now on.
    pub fn set_write_behavior(&self, behavior: WriteBehavior) {
        lock(&self.state).write_behavior = behavior;
    }

    /// Make `wait_ready` report a byte immediately.
    pub fn set_ready_byte(&self, ready: bool) {
        lock(&self.state).ready_byte = ready;
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state).opens
    }

    pub fn close_count(&self) -> usize {
        lock(&self.state).closes
    }

    /// Every accepted write, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.state).writes.clone()
    }

    /// Settings passed to every open attempt, in order.
    pub fn open_attempts(&self) -> Vec<SerialSettings> {
        lock(&self.state).settings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SerialSettings {
        SerialSettings::new("/dev/ttyACM0", 9600)
    }

    #[tokio::test]
    async fn test_open_close_counted() {
        let (connector, handle) = MockSerialConnector::new();
        let link = connector.open(&settings()).await.unwrap();
        assert_eq!(handle.open_count(), 1);
        assert_eq!(handle.close_count(), 0);
        drop(link);
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_does_not_count_open() {
        let (connector, handle) = MockSerialConnector::new();
        handle.fail_next_open("busy");
        assert!(connector.open(&settings()).await.is_err());
        assert_eq!(handle.open_count(), 0);
        assert_eq!(handle.open_attempts().len(), 1);
        assert!(connector.open(&settings()).await.is_ok());
    }

    #[tokio::test]
    async fn test_write_failure() {
        let (connector, handle) = MockSerialConnector::new();
        handle.set_write_behavior(WriteBehavior::Fail("broken pipe".to_string()));
        let mut link = connector.open(&settings()).await.unwrap();
        assert!(link.send(b"START").await.is_err());
        assert!(handle.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_without_byte() {
        let (connector, handle) = MockSerialConnector::new();
        let mut link = connector.open(&settings()).await.unwrap();
        assert!(!link.wait_ready(Duration::from_secs(2)).await.unwrap());

        handle.set_ready_byte(true);
        assert!(link.wait_ready(Duration::from_secs(2)).await.unwrap());
    }
}
