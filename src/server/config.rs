//! Server configuration.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::dispatch::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_READ_BUFFER, DispatchOptions};
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8081;

/// Default bind address.
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

// ============================================================================
// ServerConfig
// ============================================================================

/// Settings for a [`super::SerialServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: IpAddr,

    /// Port to bind; 0 picks a free port.
    pub port: u16,

    /// Follow `Already open` with an `openserial` acknowledgement.
    pub legacy_double_ack: bool,

    /// Time allowed for flushing and closing a device.
    pub close_timeout: Duration,

    /// Size of each device read buffer.
    pub read_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            legacy_double_ack: true,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }
}

impl ServerConfig {
    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the close timeout or read buffer is zero.
    pub fn validate(&self) -> Result<()> {
        if self.close_timeout.is_zero() {
            return Err(Error::config("close timeout must be greater than zero"));
        }

        if self.read_buffer == 0 {
            return Err(Error::config("read buffer size must be greater than zero"));
        }

        Ok(())
    }

    /// Returns the dispatcher settings.
    #[must_use]
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            legacy_double_ack: self.legacy_double_ack,
            close_timeout: self.close_timeout,
            read_buffer: self.read_buffer,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8081);
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(config.legacy_double_ack);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_read_buffer_rejected() {
        let config = ServerConfig {
            read_buffer: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_zero_close_timeout_rejected() {
        let config = ServerConfig {
            close_timeout: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dispatch_options_follow_config() {
        let config = ServerConfig {
            legacy_double_ack: false,
            read_buffer: 512,
            ..ServerConfig::default()
        };
        let options = config.dispatch_options();
        assert!(!options.legacy_double_ack);
        assert_eq!(options.read_buffer, 512);
        assert_eq!(options.close_timeout, config.close_timeout);
    }
}
