//! WebSocket listener and accept loop.
//!
//! # Connection Flow
//!
//! 1. `Listener::bind` binds the TCP socket
//! 2. The accept loop takes TCP connections until the shutdown flag is set
//! 3. Each connection completes the WebSocket handshake in its own task
//! 4. The new client is queued as [`Event::Connected`]
//! 5. The connection event loop starts forwarding frames

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::dispatch::{Event, EventSender};
use crate::error::{Error, Result};
use crate::identifiers::ClientId;
use crate::session::ClientHandle;

use super::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for the WebSocket handshake of a new connection.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval at which the accept loop checks the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Listener
// ============================================================================

/// A bound WebSocket listener.
///
/// # Example
///
/// ```ignore
/// use std::net::{IpAddr, Ipv4Addr};
/// use serial_bridge::transport::Listener;
///
/// let listener = Listener::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
/// println!("{}", listener.ws_url());
/// ```
#[derive(Debug)]
pub struct Listener {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Address the listener is bound to.
    local_addr: SocketAddr,
}

impl Listener {
    /// Binds to the specified address and port.
    ///
    /// Use port 0 to let the OS assign a random available port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let local_addr = listener.local_addr()?;

        debug!(addr = %local_addr, "WebSocket listener bound");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the port the listener is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the bound socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the WebSocket URL clients connect to.
    ///
    /// Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }
}

// ============================================================================
// Listener - Accept Loop
// ============================================================================

impl Listener {
    /// Accepts connections until `shutdown` is set.
    pub(crate) async fn accept_loop(self, events: EventSender, shutdown: Arc<AtomicBool>) {
        info!(addr = %self.local_addr, "Accept loop started");

        loop {
            if shutdown.load(Ordering::SeqCst) {
                debug!("Accept loop shutting down");
                break;
            }

            // Accept with timeout to allow checking shutdown flag
            match timeout(ACCEPT_POLL_INTERVAL, self.listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let events = events.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, addr, events).await {
                            warn!(error = %e, ?addr, "Connection handling failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("Accept loop terminated");
    }

    /// Upgrades one TCP connection and hands it to the dispatcher.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        events: EventSender,
    ) -> Result<()> {
        debug!(?addr, "New TCP connection");

        let ws_stream = timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::accept_async(stream))
            .await
            .map_err(|_| Error::connection("WebSocket handshake timed out"))??;

        let client_id = ClientId::next();
        let (connection, command_rx) = Connection::channel(client_id);

        // Registration is queued before the first frame can be read.
        events
            .send(Event::Connected(ClientHandle::new(
                client_id,
                connection,
                Some(addr),
            )))
            .map_err(|_| Error::ConnectionClosed)?;

        debug!(client_id = %client_id, ?addr, "WebSocket connection established");

        Connection::run_event_loop(client_id, ws_stream, command_rx, events).await;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;

    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    use crate::dispatch::channel;

    async fn bind_local() -> Listener {
        Listener::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .expect("bind should succeed")
    }

    #[tokio::test]
    async fn test_bind_random_port() {
        let listener = bind_local().await;

        assert!(listener.port() > 0);
        assert_eq!(listener.local_addr().ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(
            listener.ws_url(),
            format!("ws://127.0.0.1:{}", listener.port())
        );
    }

    #[tokio::test]
    async fn test_connection_events_in_order() {
        let listener = bind_local().await;
        let url = listener.ws_url();
        let (events_tx, mut events_rx) = channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let accept = tokio::spawn(listener.accept_loop(events_tx, Arc::clone(&shutdown)));

        let (mut ws, _) = connect_async(url.as_str()).await.expect("connect");
        ws.send(Message::Text("first".into())).await.expect("send");
        ws.close(None).await.expect("close");

        let Some(Event::Connected(handle)) = events_rx.recv().await else {
            panic!("expected Connected first");
        };
        let client = handle.id();

        let Some(Event::Frame { client: from, text }) = events_rx.recv().await else {
            panic!("expected Frame");
        };
        assert_eq!(from, client);
        assert_eq!(text, "first");

        let Some(Event::Disconnected { client: gone }) = events_rx.recv().await else {
            panic!("expected Disconnected");
        };
        assert_eq!(gone, client);

        shutdown.store(true, Ordering::SeqCst);
        accept.await.expect("accept loop exits");
    }
}
