//! Request decoding.
//!
//! Inbound frames are decoded once into the closed [`Request`] enum so the
//! dispatcher never inspects raw JSON.
//!
//! # Format
//!
//! ```json
//! { "method": "openserial", "data": { "serialport": "/dev/ttyACM0", "serialoptions": { "baudRate": 9600 } } }
//! ```
//!
//! Both `method` and `data` must be present; `data` may be `null`.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::PortId;

use super::SerialOptions;

// ============================================================================
// Method
// ============================================================================

/// Request methods understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `echo`
    Echo,
    /// `list`
    List,
    /// `openserial`
    OpenSerial,
    /// `write`
    Write,
    /// `close`
    Close,
}

impl Method {
    /// Parses a wire method name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "echo" => Some(Self::Echo),
            "list" => Some(Self::List),
            "openserial" => Some(Self::OpenSerial),
            "write" => Some(Self::Write),
            "close" => Some(Self::Close),
            _ => None,
        }
    }

    /// Returns the wire method name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::List => "list",
            Self::OpenSerial => "openserial",
            Self::Write => "write",
            Self::Close => "close",
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Send `data` back to the sender.
    Echo(Value),

    /// List available serial ports.
    List,

    /// Open or attach to a serial port.
    OpenSerial(OpenSerialRequest),

    /// Write bytes to an open port.
    Write(WriteRequest),

    /// Detach from one or all open ports.
    Close(CloseRequest),
}

/// Payload of an `openserial` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSerialRequest {
    /// Port to open.
    pub port: PortId,
    /// Line settings, used only if this request creates the session.
    pub options: SerialOptions,
}

/// Payload of a `write` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Explicit target port, if the client named one.
    pub port: Option<PortId>,
    /// Bytes to transmit.
    pub bytes: Vec<u8>,
}

/// Payload of a `close` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    /// Explicit target port; `None` closes every port the client holds.
    pub port: Option<PortId>,
}

impl Request {
    /// Decodes one text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedFrame`] if the text is not a JSON object with
    ///   `method` and `data`
    /// - [`Error::UnknownMethod`] if `method` is not recognized
    /// - [`Error::InvalidRequest`] if `data` has the wrong shape for `method`
    pub fn decode(text: &str) -> Result<Self> {
        let frame: Value =
            serde_json::from_str(text).map_err(|e| Error::malformed(e.to_string()))?;

        let Value::Object(mut fields) = frame else {
            return Err(Error::malformed("frame is not an object"));
        };

        let method = match fields.remove("method") {
            Some(Value::String(method)) => method,
            Some(_) => return Err(Error::malformed("method is not a string")),
            None => return Err(Error::malformed("missing method")),
        };

        let data = fields
            .remove("data")
            .ok_or_else(|| Error::malformed("missing data"))?;

        let method = Method::parse(&method).ok_or_else(|| Error::unknown_method(method))?;

        Self::from_parts(method, data)
    }

    /// Builds a request from an already split method and payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if `data` has the wrong shape.
    pub fn from_parts(method: Method, data: Value) -> Result<Self> {
        match method {
            Method::Echo => Ok(Self::Echo(data)),
            Method::List => Ok(Self::List),
            Method::OpenSerial => parse_open(data).map(Self::OpenSerial),
            Method::Write => parse_write(data).map(Self::Write),
            Method::Close => parse_close(data).map(Self::Close),
        }
    }

    /// Returns the method of this request.
    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::Echo(_) => Method::Echo,
            Self::List => Method::List,
            Self::OpenSerial(_) => Method::OpenSerial,
            Self::Write(_) => Method::Write,
            Self::Close(_) => Method::Close,
        }
    }
}

// ============================================================================
// Payload Parsing
// ============================================================================

fn parse_open(data: Value) -> Result<OpenSerialRequest> {
    let port = data
        .get("serialport")
        .and_then(Value::as_str)
        .and_then(PortId::new)
        .ok_or_else(Error::missing_port)?;

    let options = match data.get("serialoptions") {
        None | Some(Value::Null) => SerialOptions::default(),
        Some(raw) => SerialOptions::deserialize(raw)
            .map_err(|e| Error::invalid_request(format!("invalid serial options: {e}")))?,
    };

    options
        .validate()
        .map_err(|e| Error::invalid_request(format!("invalid serial options: {e}")))?;

    Ok(OpenSerialRequest { port, options })
}

fn parse_write(data: Value) -> Result<WriteRequest> {
    match data {
        Value::Object(mut fields) => {
            let port = target_port(&fields)?.ok_or_else(|| {
                Error::invalid_request("write object must name a serialport")
            })?;
            let payload = fields
                .remove("data")
                .ok_or_else(|| Error::invalid_request("write object is missing data"))?;

            Ok(WriteRequest {
                port: Some(port),
                bytes: payload_bytes(&payload)?,
            })
        }
        other => Ok(WriteRequest {
            port: None,
            bytes: payload_bytes(&other)?,
        }),
    }
}

fn parse_close(data: Value) -> Result<CloseRequest> {
    let port = match &data {
        Value::Object(fields) => target_port(fields)?,
        Value::String(name) => PortId::new(name),
        _ => None,
    };
    Ok(CloseRequest { port })
}

/// Reads an optional `serialport` field.
fn target_port(fields: &Map<String, Value>) -> Result<Option<PortId>> {
    match fields.get("serialport") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) => PortId::new(name)
            .map(Some)
            .ok_or_else(|| Error::invalid_request("serialport must not be empty")),
        Some(_) => Err(Error::invalid_request("serialport must be a string")),
    }
}

/// Converts a write payload into raw bytes.
///
/// Strings are sent as UTF-8, numbers as a single byte, arrays byte by byte.
fn payload_bytes(payload: &Value) -> Result<Vec<u8>> {
    match payload {
        Value::String(text) => Ok(text.as_bytes().to_vec()),
        Value::Number(_) => Ok(vec![as_byte(payload)?]),
        Value::Array(items) => items.iter().map(as_byte).collect(),
        _ => Err(Error::invalid_request(
            "write data must be a string, a byte or an array of bytes",
        )),
    }
}

fn as_byte(value: &Value) -> Result<u8> {
    value
        .as_u64()
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| Error::invalid_request(format!("{value} is not a byte value")))
}

// ============================================================================
// Tests
// ============================================================================
