//! Events consumed by the dispatcher.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio::sync::mpsc;

use crate::device::DeviceEvent;
use crate::identifiers::ClientId;
use crate::session::ClientHandle;

// ============================================================================
// Types
// ============================================================================

/// Sending side of the dispatcher queue.
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Receiving side of the dispatcher queue.
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Creates a dispatcher queue.
#[inline]
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

// ============================================================================
// Event
// ============================================================================

/// Everything that can change registry state, in arrival order.
pub enum Event {
    /// A connection completed its WebSocket handshake.
    ///
    /// Queued before the connection starts reading, so it always precedes
    /// that client's frames.
    Connected(ClientHandle),

    /// A text frame arrived from a client.
    Frame {
        /// Sender.
        client: ClientId,
        /// Raw frame text.
        text: String,
    },

    /// A client connection ended. Always the last event for that client.
    Disconnected {
        /// The client that went away.
        client: ClientId,
    },

    /// A device produced data or went away.
    Device(DeviceEvent),
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected(handle) => f.debug_tuple("Connected").field(&handle.id()).finish(),
            Self::Frame { client, text } => f
                .debug_struct("Frame")
                .field("client", client)
                .field("len", &text.len())
                .finish(),
            Self::Disconnected { client } => f
                .debug_struct("Disconnected")
                .field("client", client)
                .finish(),
            Self::Device(event) => f.debug_tuple("Device").field(event).finish(),
        }
    }
}
