//! Builder pattern for server configuration.
//!
//! Provides a fluent API for configuring and creating [`SerialServer`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use serial_bridge::SerialServer;
//!
//! # fn example() -> serial_bridge::Result<()> {
//! let server = SerialServer::builder()
//!     .port(8081)
//!     .strict_ack()
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::device::{SerialBackend, TokioSerialBackend};
use crate::error::Result;

use super::config::ServerConfig;
use super::core::SerialServer;

// ============================================================================
// SerialServerBuilder
// ============================================================================

/// Builder for configuring a [`SerialServer`] instance.
///
/// Use [`SerialServer::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct SerialServerBuilder {
    /// Settings.
    config: ServerConfig,
    /// Device backend; the OS serial ports when unset.
    backend: Option<Arc<dyn SerialBackend>>,
}

impl std::fmt::Debug for SerialServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialServerBuilder")
            .field("config", &self.config)
            .field("custom_backend", &self.backend.is_some())
            .finish()
    }
}

// ============================================================================
// SerialServerBuilder Implementation
// ============================================================================

impl SerialServerBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all settings.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    /// Sets the port to bind; 0 picks a free port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Answers a duplicate `openserial` with the error frame only.
    #[inline]
    #[must_use]
    pub fn strict_ack(mut self) -> Self {
        self.config.legacy_double_ack = false;
        self
    }

    /// Sets whether `Already open` is followed by an acknowledgement.
    #[inline]
    #[must_use]
    pub fn legacy_double_ack(mut self, enabled: bool) -> Self {
        self.config.legacy_double_ack = enabled;
        self
    }

    /// Sets the time allowed for closing a device.
    #[inline]
    #[must_use]
    pub fn close_timeout(mut self, close_timeout: Duration) -> Self {
        self.config.close_timeout = close_timeout;
        self
    }

    /// Sets the device read buffer size.
    #[inline]
    #[must_use]
    pub fn read_buffer(mut self, size: usize) -> Self {
        self.config.read_buffer = size;
        self
    }

    /// Sets the device backend.
    #[inline]
    #[must_use]
    pub fn backend(mut self, backend: impl SerialBackend + 'static) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Builds the server with validation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the settings are invalid.
    pub fn build(self) -> Result<SerialServer> {
        self.config.validate()?;

        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(TokioSerialBackend::new()));

        Ok(SerialServer::new(self.config, backend))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::device::MockBackend;

    #[test]
    fn test_new_uses_defaults() {
        let builder = SerialServerBuilder::new();
        assert_eq!(builder.config, ServerConfig::default());
        assert!(builder.backend.is_none());
    }

    #[test]
    fn test_setters() {
        let builder = SerialServerBuilder::new()
            .port(0)
            .strict_ack()
            .read_buffer(64)
            .close_timeout(Duration::from_millis(250));

        assert_eq!(builder.config.port, 0);
        assert!(!builder.config.legacy_double_ack);
        assert_eq!(builder.config.read_buffer, 64);
        assert_eq!(builder.config.close_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_build_validates() {
        let result = SerialServerBuilder::new()
            .backend(MockBackend::new())
            .read_buffer(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_with_backend() {
        let server = SerialServerBuilder::new()
            .backend(MockBackend::new())
            .port(0)
            .build()
            .expect("valid config");
        assert_eq!(server.config().port, 0);
    }
}
