//! Shared serial session.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::device::{DeviceHandle, SerialBackend};
use crate::dispatch::EventSender;
use crate::error::Result;
use crate::identifiers::{PortId, SessionId};
use crate::protocol::SerialOptions;

// ============================================================================
// SerialSession
// ============================================================================

/// One open physical port shared by its attached clients.
///
/// Sessions are owned by the registry, which decides when to close them.
pub struct SerialSession {
    /// Incarnation id; reopening a port creates a new one.
    id: SessionId,
    /// Port name.
    port: PortId,
    /// Line settings the device was opened with.
    options: SerialOptions,
    /// Handle to the device I/O task.
    device: DeviceHandle,
    /// When the device was opened.
    opened_at: Instant,
}

impl fmt::Debug for SerialSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialSession")
            .field("id", &self.id)
            .field("port", &self.port)
            .field("baud_rate", &self.options.baud_rate)
            .field("open", &self.device.is_open())
            .finish_non_exhaustive()
    }
}

impl SerialSession {
    /// Opens the device and starts forwarding its data to `events`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceOpen`] if the device cannot be claimed.
    pub async fn open(
        backend: &dyn SerialBackend,
        port: PortId,
        options: SerialOptions,
        events: EventSender,
        read_buffer: usize,
    ) -> Result<Self> {
        let stream = backend.open(&port, &options).await?;
        let id = SessionId::next();
        let device = DeviceHandle::spawn(id, port.clone(), stream, events, read_buffer);

        info!(port = %port, session_id = %id, baud_rate = options.baud_rate, "Serial session opened");

        Ok(Self {
            id,
            port,
            options,
            device,
            opened_at: Instant::now(),
        })
    }

    /// Creates a session whose device is not backed by any task.
    #[cfg(test)]
    pub(crate) fn detached(port: PortId) -> Self {
        let id = SessionId::next();
        Self {
            id,
            device: DeviceHandle::detached(port.clone()),
            port,
            options: SerialOptions::default(),
            opened_at: Instant::now(),
        }
    }

    /// Returns the session incarnation id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the port name.
    #[inline]
    #[must_use]
    pub fn port(&self) -> &PortId {
        &self.port
    }

    /// Returns the options the device was opened with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SerialOptions {
        &self.options
    }

    /// Returns how long the device has been open.
    #[inline]
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Returns `true` until [`SerialSession::close`] is called.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.device.is_open()
    }

    /// Queues bytes for the device.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceLost`] if the device task has stopped.
    pub fn write(&self, bytes: Vec<u8>) -> Result<()> {
        self.device.write(bytes)
    }

    /// Flushes, drains and closes the device.
    ///
    /// Idempotent. Failures are logged and swallowed: the session is gone
    /// from the registry's point of view either way.
    pub async fn close(&mut self, close_timeout: Duration) {
        if !self.device.is_open() {
            return;
        }

        match self.device.close(close_timeout).await {
            Ok(()) => info!(
                port = %self.port,
                session_id = %self.id,
                uptime_secs = self.uptime().as_secs(),
                "Serial session closed"
            ),
            Err(e) => warn!(port = %self.port, error = %e, "Serial close error"),
        }
    }
}
