//! Response frames sent to clients.
//!
//! # Format
//!
//! ```json
//! { "method": "openserial", "data": {} }
//! { "method": "error", "data": "Already open" }
//! { "method": "data", "data": [104, 105] }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Response
// ============================================================================

/// A frame sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "data", rename_all = "lowercase")]
pub enum Response {
    /// Echo of the request payload.
    Echo(Value),

    /// Names of the available serial ports.
    List(Vec<String>),

    /// Acknowledges that the client is attached to the requested port.
    OpenSerial(Ack),

    /// Human-readable error.
    Error(String),

    /// Bytes read from a serial device.
    Data(Vec<u8>),
}

/// Empty acknowledgement payload, serialized as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Ack {}

impl Response {
    /// Creates an `openserial` acknowledgement.
    #[inline]
    #[must_use]
    pub fn opened() -> Self {
        Self::OpenSerial(Ack {})
    }

    /// Creates an `error` frame from a crate error.
    #[inline]
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        Self::Error(error.reply_message())
    }

    /// Serializes the frame to JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns the wire method name.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Echo(_) => "echo",
            Self::List(_) => "list",
            Self::OpenSerial(_) => "openserial",
            Self::Error(_) => "error",
            Self::Data(_) => "data",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn to_value(response: &Response) -> Value {
        serde_json::from_str(&response.encode().expect("encode")).expect("parse")
    }

    #[test]
    fn test_opened_serializes_empty_object() {
        assert_eq!(
            to_value(&Response::opened()),
            json!({ "method": "openserial", "data": {} })
        );
    }

    #[test]
    fn test_error_frame() {
        let response = Response::from_error(&Error::missing_port());
        assert_eq!(
            to_value(&response),
            json!({ "method": "error", "data": "you must specify a serial port to open" })
        );
    }

    #[test]
    fn test_echo_preserves_payload() {
        let payload = json!({ "nested": [1, "two"] });
        assert_eq!(
            to_value(&Response::Echo(payload.clone())),
            json!({ "method": "echo", "data": payload })
        );
    }

    #[test]
    fn test_data_and_list_frames() {
        assert_eq!(
            to_value(&Response::Data(vec![104, 105])),
            json!({ "method": "data", "data": [104, 105] })
        );
        assert_eq!(
            to_value(&Response::List(vec!["COM1".into()])),
            json!({ "method": "list", "data": ["COM1"] })
        );
    }

    #[test]
    fn test_method_matches_tag() {
        let response = Response::Error("x".into());
        assert_eq!(to_value(&response)["method"], response.method());
    }
}
