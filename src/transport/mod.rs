//! WebSocket transport layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐                          ┌──────────────────────┐
//! │  Client     │        WebSocket         │  Listener            │
//! │  (browser   │◄────────────────────────►│  → Connection task   │
//! │   sketch)   │      ws://HOST:PORT      │  → Dispatcher queue  │
//! └─────────────┘                          └──────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Listener::bind` - Bind the listening socket
//! 2. Accept loop upgrades each TCP connection to WebSocket
//! 3. The client is registered with the dispatcher
//! 4. `Connection` - Queue frames to the client
//! 5. `Connection::shutdown` - Close the WebSocket (also on drop)
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `server` | Listener binding and accept loop |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// WebSocket listener and accept loop.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub(crate) use connection::ConnectionCommand;
pub use server::Listener;
