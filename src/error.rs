//! Error types for the serial bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use serial_bridge::{Error, Result};
//!
//! fn port_name(raw: &str) -> Result<PortId> {
//!     PortId::new(raw).ok_or_else(|| Error::invalid_request("empty port name"))
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Protocol | [`Error::MalformedFrame`], [`Error::UnknownMethod`], [`Error::InvalidRequest`] |
//! | Session | [`Error::AlreadyOpen`], [`Error::PortNotOpen`], [`Error::AmbiguousTarget`] |
//! | Device | [`Error::DeviceOpen`], [`Error::DeviceClose`], [`Error::DeviceLost`], [`Error::Enumeration`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! Protocol and session errors are reported to the originating client as
//! `error` frames carrying [`Error::reply_message`]. Device close errors are
//! only logged.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::PortId;

// ============================================================================
// Constants
// ============================================================================

/// Reply text for an `openserial` request without a usable port name.
pub const MISSING_PORT_MESSAGE: &str = "you must specify a serial port to open";

/// Reply text for a duplicate `openserial` from the same client.
pub const ALREADY_OPEN_MESSAGE: &str = "Already open";

/// Reply text for frames that cannot be decoded.
pub const MALFORMED_FRAME_MESSAGE: &str = "not a message I understand";

/// Reply text for an untargeted write while several ports are open.
pub const AMBIGUOUS_WRITE_MESSAGE: &str = "you must specify a serial port to write to";

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when server configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Frame is not valid JSON or lacks `method`/`data`.
    #[error("Malformed frame: {message}")]
    MalformedFrame {
        /// Description of the decoding failure.
        message: String,
    },

    /// Well-formed frame with a method this server does not know.
    #[error("Unknown method: {method}")]
    UnknownMethod {
        /// The unrecognized method.
        method: String,
    },

    /// A required field is missing or has the wrong shape.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Client-facing description.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// The client already has this port open.
    #[error("Serial port {port} is already open by this client")]
    AlreadyOpen {
        /// The port that was requested twice.
        port: PortId,
    },

    /// The client targeted a port it does not have open.
    #[error("Serial port {port} is not open")]
    PortNotOpen {
        /// The targeted port.
        port: PortId,
    },

    /// An untargeted write while the client has several ports open.
    #[error("Write target is ambiguous: {open} ports open")]
    AmbiguousTarget {
        /// Number of ports the client has open.
        open: usize,
    },

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// The device could not be claimed.
    #[error("Failed to open serial port {port}: {message}")]
    DeviceOpen {
        /// Port that failed to open.
        port: PortId,
        /// Reason reported by the device layer.
        message: String,
    },

    /// Flushing, draining or closing the device failed.
    #[error("Failed to close serial port {port}: {message}")]
    DeviceClose {
        /// Port that failed to close.
        port: PortId,
        /// Reason reported by the device layer.
        message: String,
    },

    /// The device stopped delivering data unexpectedly.
    #[error("Serial port {port} closed: {message}")]
    DeviceLost {
        /// Port that went away.
        port: PortId,
        /// Reason reported by the device layer.
        message: String,
    },

    /// Listing available ports failed.
    #[error("Failed to list serial ports: {message}")]
    Enumeration {
        /// Reason reported by the enumeration backend.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The peer connection or device task is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a malformed frame error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Creates an unknown method error.
    #[inline]
    pub fn unknown_method(method: impl Into<String>) -> Self {
        Self::UnknownMethod {
            method: method.into(),
        }
    }

    /// Creates an invalid request error.
    #[inline]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates the error for an `openserial` without a port name.
    #[inline]
    pub fn missing_port() -> Self {
        Self::invalid_request(MISSING_PORT_MESSAGE)
    }

    /// Creates an already open error.
    #[inline]
    pub fn already_open(port: PortId) -> Self {
        Self::AlreadyOpen { port }
    }

    /// Creates a port not open error.
    #[inline]
    pub fn port_not_open(port: PortId) -> Self {
        Self::PortNotOpen { port }
    }

    /// Creates an ambiguous target error.
    #[inline]
    pub fn ambiguous_target(open: usize) -> Self {
        Self::AmbiguousTarget { open }
    }

    /// Creates a device open error.
    #[inline]
    pub fn device_open(port: PortId, message: impl Into<String>) -> Self {
        Self::DeviceOpen {
            port,
            message: message.into(),
        }
    }

    /// Creates a device close error.
    #[inline]
    pub fn device_close(port: PortId, message: impl Into<String>) -> Self {
        Self::DeviceClose {
            port,
            message: message.into(),
        }
    }

    /// Creates a device lost error.
    #[inline]
    pub fn device_lost(port: PortId, message: impl Into<String>) -> Self {
        Self::DeviceLost {
            port,
            message: message.into(),
        }
    }

    /// Creates an enumeration error.
    #[inline]
    pub fn enumeration(message: impl Into<String>) -> Self {
        Self::Enumeration {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the client sent something the protocol rejects.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame { .. }
                | Self::UnknownMethod { .. }
                | Self::InvalidRequest { .. }
                | Self::AlreadyOpen { .. }
                | Self::PortNotOpen { .. }
                | Self::AmbiguousTarget { .. }
        )
    }

    /// Returns `true` if this is a device error.
    #[inline]
    #[must_use]
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceOpen { .. }
                | Self::DeviceClose { .. }
                | Self::DeviceLost { .. }
                | Self::Enumeration { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Client Replies
// ============================================================================

impl Error {
    /// Returns the text sent to a client in an `error` frame.
    ///
    /// Legacy clients match on the exact strings for missing ports and
    /// duplicate opens, so those are kept verbatim.
    #[must_use]
    pub fn reply_message(&self) -> String {
        match self {
            Self::MalformedFrame { .. } => MALFORMED_FRAME_MESSAGE.to_string(),
            Self::InvalidRequest { message } => message.clone(),
            Self::AlreadyOpen { .. } => ALREADY_OPEN_MESSAGE.to_string(),
            Self::AmbiguousTarget { .. } => AMBIGUOUS_WRITE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
