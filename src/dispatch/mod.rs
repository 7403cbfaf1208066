//! Ordered event dispatch.
//!
//! Every state change flows through one queue, drained by one task:
//!
//! ```text
//!  connection tasks ──┐
//!                     ├──► EventSender ──► Dispatcher (owns Registry)
//!  device tasks ──────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `dispatcher` | [`Dispatcher`] routing requests and device events |
//! | `event` | [`Event`] and the queue types |

// ============================================================================
// Submodules
// ============================================================================

/// Request routing and session lifecycle.
pub mod dispatcher;

/// Dispatcher queue events.
pub mod event;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_READ_BUFFER, DispatchOptions, Dispatcher};
pub use event::{Event, EventReceiver, EventSender, channel};
