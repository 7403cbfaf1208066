//! Connected client handle.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use tracing::trace;

use crate::error::Result;
use crate::identifiers::ClientId;
use crate::protocol::Response;
use crate::transport::Connection;

// ============================================================================
// ClientHandle
// ============================================================================

/// One connected client.
///
/// Owns the sending side of the client's connection. Dropping the handle
/// shuts the connection down, whichever path removed it. The ports a client
/// has open live in the registry's attachment relation, not here.
pub struct ClientHandle {
    /// Client identifier.
    id: ClientId,
    /// Outbound side of the WebSocket connection.
    connection: Connection,
    /// Remote address, if known.
    peer: Option<SocketAddr>,
    /// When the connection was accepted.
    connected_at: Instant,
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl ClientHandle {
    /// Creates a handle for an accepted connection.
    #[must_use]
    pub fn new(id: ClientId, connection: Connection, peer: Option<SocketAddr>) -> Self {
        Self {
            id,
            connection,
            peer,
            connected_at: Instant::now(),
        }
    }

    /// Returns the client id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Returns the remote address, if known.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Returns when the connection was accepted.
    #[inline]
    #[must_use]
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Serializes and queues one frame for the client.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Json`] if the frame cannot be serialized
    /// - [`crate::Error::ConnectionClosed`] if the connection is gone
    pub fn send(&self, response: &Response) -> Result<()> {
        trace!(client_id = %self.id, method = response.method(), "Sending frame");
        self.connection.send(response)
    }

    /// Queues an already encoded frame for the client.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ConnectionClosed`] if the connection is gone.
    pub fn send_text(&self, text: String) -> Result<()> {
        self.connection.send_text(text)
    }

    /// Closes the connection.
    pub fn close(&self) {
        self.connection.shutdown();
    }
}
