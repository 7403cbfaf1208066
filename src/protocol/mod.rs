//! WebSocket protocol message types.
//!
//! Every frame is a JSON object with a `method` and a `data` field.
//!
//! # Protocol Overview
//!
//! | Method | Direction | Purpose |
//! |--------|-----------|---------|
//! | `echo` | Both | Return the payload to the sender |
//! | `list` | Both | Enumerate available serial ports |
//! | `openserial` | Both | Open or attach to a port; acknowledged with `{}` |
//! | `write` | Client → Server | Transmit bytes to an open port |
//! | `close` | Client → Server | Detach from one or all open ports |
//! | `data` | Server → Client | Bytes read from a port |
//! | `error` | Server → Client | Human-readable failure |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `options` | Serial line settings from `openserial` |
//! | `request` | Inbound request decoding |
//! | `response` | Outbound frame encoding |

// ============================================================================
// Submodules
// ============================================================================

/// Serial line options.
pub mod options;

/// Request decoding.
pub mod request;

/// Response frames.
pub mod response;

// ============================================================================
// Re-exports
// ============================================================================

pub use options::{DataBits, FlowControl, Parity, SerialOptions, StopBits};
pub use request::{CloseRequest, Method, OpenSerialRequest, Request, WriteRequest};
pub use response::{Ack, Response};
