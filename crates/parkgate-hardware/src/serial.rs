//! Serial backend built on the `serialport` crate.
//!
//! `serialport` is blocking, so every port operation runs on the blocking
//! pool. The port handle is moved into the blocking task and handed back
//! afterwards; if the task is abandoned (for example by a caller timeout) the
//! handle is dropped with it, which closes the port.

use crate::error::{HardwareError, Result};
use crate::traits::{SerialConnector, SerialLink};
use crate::types::SerialSettings;
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, trace};

/// Opens real serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortConnector;

impl SerialPortConnector {
    pub fn new() -> Self {
        Self
    }
}

impl SerialConnector for SerialPortConnector {
    type Link = SerialPortLink;

    async fn open(&self, settings: &SerialSettings) -> Result<SerialPortLink> {
        let path = settings.port.clone();
        let baud_rate = settings.baud_rate;
        let timeout = settings.timeout;

        let port = tokio::task::spawn_blocking(move || {
            serialport::new(path, baud_rate).timeout(timeout).open()
        })
        .await
        .map_err(|e| HardwareError::communication(format!("open task failed: {e}")))?
        .map_err(|e| HardwareError::open_failed(format!("{}: {e}", settings.port)))?;

        debug!(port = %settings.port, baud_rate, "Serial port opened");

        Ok(SerialPortLink {
            port: Some(port),
            name: settings.port.clone(),
            timeout,
        })
    }
}

/// An open port. Closed on drop.
pub struct SerialPortLink {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    timeout: Duration,
}

impl std::fmt::Debug for SerialPortLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortLink")
            .field("name", &self.name)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialPortLink {
    /// Run a blocking operation against the port.
    async fn with_port<T, F>(&mut self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SerialPort) -> Result<T> + Send + 'static,
    {
        let mut port = self
            .port
            .take()
            .ok_or_else(|| HardwareError::disconnected(&self.name))?;

        let (port, result) = tokio::task::spawn_blocking(move || {
            let result = op(port.as_mut());
            (port, result)
        })
        .await
        .map_err(|e| HardwareError::communication(format!("serial task failed: {e}")))?;

        self.port = Some(port);
        result
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

impl SerialLink for SerialPortLink {
    async fn wait_ready(&mut self, wait: Duration) -> Result<bool> {
        let restore = self.timeout;

        self.with_port(move |port| {
            port.set_timeout(wait)?;

            let mut buf = [0u8; 64];
            let ready = match port.read(&mut buf) {
                Ok(n) => n > 0,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => false,
                Err(e) => return Err(e.into()),
            };

            // Drop any banner the board printed so it is not read later.
            port.clear(ClearBuffer::Input)?;
            port.set_timeout(restore)?;
            Ok(ready)
        })
        .await
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let data = data.to_vec();
        let timeout_ms = self.timeout_ms();
        trace!(port = %self.name, bytes = data.len(), "Writing to serial port");

        self.with_port(move |port| {
            let written = port.write_all(&data).and_then(|()| port.flush());
            match written {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    Err(HardwareError::timeout(timeout_ms))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }
}

impl Drop for SerialPortLink {
    fn drop(&mut self) {
        if self.port.take().is_some() {
            debug!(port = %self.name, "Serial port closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let connector = SerialPortConnector::new();
        let settings = SerialSettings::new("/dev/parkgate-does-not-exist", 9600);
        let result = connector.open(&settings).await;
        assert!(matches!(result, Err(HardwareError::OpenFailed { .. })));
    }
}
