//! Serial Bridge - WebSocket access to local serial ports.
//!
//! This library lets browser sketches (or any WebSocket client) open, read
//! and write the serial ports of the machine it runs on.
//!
//! # Architecture
//!
//! The server multiplexes many clients over few devices:
//!
//! - **Clients**: WebSocket connections sending JSON `{method, data}` frames
//! - **Sessions**: One per open port, shared by every client that opened it
//! - **Dispatcher**: One task owning all state, fed by an ordered event queue
//!
//! Key design principles:
//!
//! - A port is opened once and closed when its last client lets go
//! - Device data is broadcast to every attached client
//! - Connection and device tasks never touch shared state directly
//!
//! # Quick Start
//!
//! ```no_run
//! use serial_bridge::{Result, SerialServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let running = SerialServer::builder()
//!         .port(8081)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     println!("Listening on {}", running.ws_url());
//!
//!     tokio::signal::ctrl_c().await?;
//!     running.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`device`] | Serial backends and device I/O tasks |
//! | [`dispatch`] | Event queue and [`Dispatcher`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | JSON frame types |
//! | [`server`] | [`SerialServer`] configuration and lifecycle |
//! | [`session`] | Session registry |
//! | [`transport`] | WebSocket listener and connections |

// ============================================================================
// Modules
// ============================================================================

/// Serial device access.
///
/// [`SerialBackend`] abstracts enumeration and opening, with the OS
/// implementation in [`TokioSerialBackend`] and an in-memory one in
/// [`MockBackend`].
pub mod device;

/// Ordered event dispatch.
pub mod dispatch;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for clients, sessions and ports.
pub mod identifiers;

/// WebSocket protocol message types.
pub mod protocol;

/// Server configuration and lifecycle.
///
/// Use [`SerialServer::builder()`] to create a configured server.
pub mod server;

/// Session multiplexing state.
pub mod session;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Device types
pub use device::{MockBackend, MockDevice, PortInfo, SerialBackend, TokioSerialBackend};

// Dispatch types
pub use dispatch::{DispatchOptions, Dispatcher};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ClientId, PortId, SessionId};

// Protocol types
pub use protocol::{Request, Response, SerialOptions};

// Server types
pub use server::{RunningServer, SerialServer, SerialServerBuilder, ServerConfig};
