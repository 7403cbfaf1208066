//! Serial device layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  open()   ┌──────────────────┐   bytes    ┌─────────────┐
//! │ SerialBackend│──────────►│ DeviceHandle     │───────────►│ Dispatcher  │
//! │ (tokio-serial│           │ (I/O task owns   │ DeviceEvent│ queue       │
//! │  or mock)    │           │  the stream)     │◄───────────│             │
//! └──────────────┘           └──────────────────┘ write/close└─────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backend` | [`SerialBackend`] trait and [`PortInfo`] |
//! | `handle` | [`DeviceHandle`] and its I/O task |
//! | `mock` | In-memory backend for tests |
//! | `serial` | Hardware backend on `tokio-serial` |

// ============================================================================
// Submodules
// ============================================================================

/// Backend trait and port enumeration types.
pub mod backend;

/// Open device handle.
pub mod handle;

/// In-memory backend.
pub mod mock;

/// Hardware backend.
pub mod serial;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::{PortInfo, PortStream, SerialBackend};
pub use handle::{DeviceEvent, DeviceHandle};
pub use mock::{MockBackend, MockDevice};
pub use serial::TokioSerialBackend;
