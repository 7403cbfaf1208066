//! WebSocket connection and event loop.
//!
//! Each accepted client gets one tokio task that owns its WebSocket stream.
//!
//! # Event Loop
//!
//! The connection task handles:
//!
//! - Incoming text frames, forwarded to the dispatcher queue in order
//! - Outgoing frames queued by the dispatcher through [`Connection`]
//! - Shutdown requests
//!
//! When the loop ends for any reason it queues exactly one
//! [`Event::Disconnected`] for the client, after all of its frames.

// ============================================================================
// Imports
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::dispatch::{Event, EventSender};
use crate::error::{Error, Result};
use crate::identifiers::ClientId;
use crate::protocol::Response;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnectionCommand {
    /// Send an encoded frame.
    Send(String),
    /// Close the WebSocket.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// Sending side of one client's WebSocket connection.
///
/// Frames are queued without waiting, so a slow client never blocks the
/// dispatcher. Dropping the connection closes the WebSocket.
#[derive(Debug)]
pub struct Connection {
    /// Owning client.
    client_id: ClientId,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl Connection {
    /// Creates a connection and the receiver its event loop consumes.
    pub(crate) fn channel(
        client_id: ClientId,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (
            Self {
                client_id,
                command_tx,
            },
            command_rx,
        )
    }

    /// Returns `true` once the event loop has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Serializes and queues a frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if serialization fails
    /// - [`Error::ConnectionClosed`] if the event loop has stopped
    pub fn send(&self, response: &Response) -> Result<()> {
        self.send_text(response.encode()?)
    }

    /// Queues an encoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop has stopped.
    pub fn send_text(&self, text: String) -> Result<()> {
        self.command_tx
            .send(ConnectionCommand::Send(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Closes the connection after frames already queued.
    ///
    /// This is called automatically on drop.
    pub fn shutdown(&self) {
        trace!(client_id = %self.client_id, "Shutdown queued");
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop that handles WebSocket I/O.
    pub(crate) async fn run_event_loop(
        client_id: ClientId,
        ws_stream: WebSocketStream<TcpStream>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        events: EventSender,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the client
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            trace!(client_id = %client_id, len = text.len(), "Frame received");
                            let event = Event::Frame {
                                client: client_id,
                                text: text.as_str().to_owned(),
                            };
                            if events.send(event).is_err() {
                                debug!(client_id = %client_id, "Dispatcher gone");
                                let _ = ws_write.close().await;
                                break;
                            }
                        }

                        Some(Ok(Message::Binary(data))) => {
                            debug!(client_id = %client_id, len = data.len(), "Ignoring binary frame");
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!(client_id = %client_id, "WebSocket closed by client");
                            let _ = ws_write.close().await;
                            break;
                        }

                        Some(Err(e)) => {
                            warn!(client_id = %client_id, error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!(client_id = %client_id, "WebSocket stream ended");
                            break;
                        }

                        // Ping and Pong are answered by tungstenite
                        _ => {}
                    }
                }

                // Commands from the dispatcher
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(text)) => {
                            if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                                warn!(client_id = %client_id, error = %e, "Failed to send frame");
                                break;
                            }
                        }

                        Some(ConnectionCommand::Shutdown) | None => {
                            debug!(client_id = %client_id, "Shutdown requested");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        let _ = events.send(Event::Disconnected { client: client_id });
        debug!(client_id = %client_id, "Event loop terminated");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_send_encodes_frame() {
        let (connection, mut rx) = Connection::channel(ClientId::next());

        connection
            .send(&Response::Echo(json!("hi")))
            .expect("queued");

        assert_eq!(
            rx.try_recv().expect("command"),
            ConnectionCommand::Send(r#"{"method":"echo","data":"hi"}"#.to_string())
        );
    }

    #[test]
    fn test_send_after_loop_gone_fails() {
        let (connection, rx) = Connection::channel(ClientId::next());
        drop(rx);

        assert!(connection.is_closed());
        let err = connection
            .send_text("x".to_string())
            .expect_err("closed");
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[test]
    fn test_drop_requests_shutdown() {
        let (connection, mut rx) = Connection::channel(ClientId::next());
        connection.send_text("last".to_string()).expect("queued");
        drop(connection);

        assert_eq!(
            rx.try_recv().expect("frame"),
            ConnectionCommand::Send("last".to_string())
        );
        assert_eq!(rx.try_recv().expect("shutdown"), ConnectionCommand::Shutdown);
    }
}
