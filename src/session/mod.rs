//! Session multiplexing state.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 Registry                      │
//! │  sessions:    PortId   → SerialSession        │
//! │  clients:     ClientId → ClientHandle         │
//! │  attachments: PortId  ⇄  ClientId             │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! A port is opened by the first client that asks for it, shared with every
//! later client, and closed when its last client detaches.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `attachments` | Bidirectional client ↔ port relation |
//! | `client` | [`ClientHandle`] for a connected peer |
//! | `registry` | [`Registry`] owning sessions, clients and attachments |
//! | `serial` | [`SerialSession`] owning one open device |

// ============================================================================
// Submodules
// ============================================================================

/// Client ↔ port attachment relation.
pub mod attachments;

/// Connected client handle.
pub mod client;

/// Session registry.
pub mod registry;

/// Shared serial session.
pub mod serial;

// ============================================================================
// Re-exports
// ============================================================================

pub use attachments::Attachments;
pub use client::ClientHandle;
pub use registry::Registry;
pub use serial::SerialSession;
