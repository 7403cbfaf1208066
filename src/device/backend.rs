//! Device backend abstraction.
//!
//! A [`SerialBackend`] enumerates ports and opens them as byte streams.
//! The server only needs `AsyncRead + AsyncWrite`: flushing the write half
//! drains pending output and shutting it down releases the device.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::identifiers::PortId;
use crate::protocol::SerialOptions;

// ============================================================================
// PortStream
// ============================================================================

/// Byte stream of an open serial device.
pub trait PortStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> PortStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

// ============================================================================
// PortInfo
// ============================================================================

/// An available serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Port name as accepted by `openserial`.
    pub name: String,

    /// Human-readable description (USB product or manufacturer), if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PortInfo {
    /// Creates port info without a description.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

// ============================================================================
// SerialBackend
// ============================================================================

/// Opens and enumerates serial devices.
#[async_trait]
pub trait SerialBackend: Send + Sync {
    /// Lists the ports that can currently be opened.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Enumeration`] if the platform query fails.
    async fn list_ports(&self) -> Result<Vec<PortInfo>>;

    /// Opens a port with the given line settings.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceOpen`] if the device cannot be claimed.
    async fn open(&self, port: &PortId, options: &SerialOptions) -> Result<Box<dyn PortStream>>;
}
