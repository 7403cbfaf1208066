//! Request routing and session lifecycle.
//!
//! The [`Dispatcher`] is the only owner of the [`Registry`]. It drains one
//! ordered event queue and handles each event to completion before taking
//! the next, so registry updates never interleave.
//!
//! Device closes run as their own tasks once a session has left the
//! registry, so a device that is slow to close never holds up the queue.
//! Reopening a port waits for its previous close.
//!
//! # Routing
//!
//! | Event | Handling |
//! |-------|----------|
//! | `Connected` | Register the client |
//! | `Frame` | Decode, then `echo` / `list` / `openserial` / `write` / `close` |
//! | `Disconnected` | Detach from every port, close orphaned sessions |
//! | `Device::Data` | Broadcast to attached clients in attachment order |
//! | `Device::Lost` | Notify attached clients, remove and close the session |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::device::{DeviceEvent, SerialBackend};
use crate::error::{Error, Result};
use crate::identifiers::{ClientId, PortId, SessionId};
use crate::protocol::{CloseRequest, OpenSerialRequest, Request, Response, WriteRequest};
use crate::session::{Registry, SerialSession};

use super::event::{Event, EventReceiver, EventSender};

// ============================================================================
// Constants
// ============================================================================

/// Time allowed for flushing and closing a device.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Size of the device read buffer.
pub const DEFAULT_READ_BUFFER: usize = 4096;

// ============================================================================
// DispatchOptions
// ============================================================================

/// Behavior switches for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Follow an `Already open` error with an `openserial` acknowledgement,
    /// as legacy clients expect.
    pub legacy_double_ack: bool,

    /// Time allowed for flushing and closing a device.
    pub close_timeout: Duration,

    /// Size of each device read buffer.
    pub read_buffer: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            legacy_double_ack: true,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Owns the registry and applies every event to it.
pub struct Dispatcher {
    /// Sessions, clients and attachments.
    registry: Registry,
    /// Opens and enumerates devices.
    backend: Arc<dyn SerialBackend>,
    /// Queue handed to new devices for their events.
    events: EventSender,
    /// Behavior switches.
    options: DispatchOptions,
    /// Device closes still running, by port.
    closing: FxHashMap<PortId, JoinHandle<()>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("closing", &self.closing.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Dispatcher - Lifecycle
// ============================================================================

impl Dispatcher {
    /// Creates a dispatcher.
    ///
    /// `events` must feed the receiver later passed to [`Dispatcher::run`].
    #[must_use]
    pub fn new(
        backend: Arc<dyn SerialBackend>,
        events: EventSender,
        options: DispatchOptions,
    ) -> Self {
        Self {
            registry: Registry::new(),
            backend,
            events,
            options,
            closing: FxHashMap::default(),
        }
    }

    /// Returns the registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handles events until `shutdown` fires or its sender is dropped, then
    /// stops.
    pub async fn run(mut self, mut events: EventReceiver, mut shutdown: oneshot::Receiver<()>) {
        info!("Dispatcher started");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
            }
        }

        self.stop().await;
    }

    /// Closes every session, then every client connection.
    ///
    /// Device closes run concurrently and are awaited before clients are
    /// disconnected.
    pub async fn stop(&mut self) {
        let ports: Vec<&PortId> = self.registry.ports().collect();
        debug!(?ports, "Closing open ports");

        let (sessions, clients) = self.registry.drain();
        info!(
            sessions = sessions.len(),
            clients = clients.len(),
            "Dispatcher stopping"
        );

        self.close_sessions(sessions);
        self.finish_closing().await;

        for client in clients {
            debug!(client_id = %client.id(), "Closing client connection");
            client.close();
        }

        info!("Dispatcher stopped");
    }
}

// ============================================================================
// Dispatcher - Events
// ============================================================================

impl Dispatcher {
    /// Applies one event.
    pub async fn handle(&mut self, event: Event) {
        match event {
            Event::Connected(client) => {
                info!(
                    client_id = %client.id(),
                    peer = ?client.peer(),
                    clients = self.registry.client_count() + 1,
                    "Client connected"
                );
                self.registry.add_client(client);
            }

            Event::Frame { client, text } => self.handle_frame(client, &text).await,

            Event::Disconnected { client } => self.on_disconnect(client),

            Event::Device(DeviceEvent::Data {
                session,
                port,
                bytes,
            }) => self.on_device_data(session, &port, bytes),

            Event::Device(DeviceEvent::Lost {
                session,
                port,
                reason,
            }) => self.on_device_lost(session, &port, reason),
        }
    }

    /// Decodes and routes one client frame.
    async fn handle_frame(&mut self, client: ClientId, text: &str) {
        if self.registry.client(client).is_none() {
            debug!(client_id = %client, "Frame from unknown client dropped");
            return;
        }

        let request = match Request::decode(text) {
            Ok(request) => request,
            Err(Error::UnknownMethod { method }) => {
                warn!(client_id = %client, method = %method, "Ignoring unknown method");
                return;
            }
            Err(e) => {
                warn!(client_id = %client, error = %e, "Rejected frame");
                self.reply_error(client, &e);
                return;
            }
        };

        debug!(client_id = %client, method = request.method().as_str(), "Request");

        let result = match request {
            Request::Echo(data) => {
                self.reply(client, Response::Echo(data));
                Ok(())
            }
            Request::List => self.list(client).await,
            Request::OpenSerial(open) => self.open_serial(client, open).await,
            Request::Write(write) => self.write(client, write),
            Request::Close(close) => self.close(client, close),
        };

        if let Err(e) = result {
            warn!(client_id = %client, error = %e, "Request failed");
            self.reply_error(client, &e);
        }
    }

    /// Detaches a disconnected client and closes sessions it alone held.
    fn on_disconnect(&mut self, client: ClientId) {
        let Some((handle, orphaned)) = self.registry.remove_client(client) else {
            debug!(client_id = %client, "Disconnect of unknown client");
            return;
        };

        info!(
            client_id = %client,
            ports_closed = orphaned.len(),
            clients = self.registry.client_count(),
            connected_secs = handle.connected_at().elapsed().as_secs(),
            "Client disconnected"
        );

        drop(handle);
        self.close_sessions(orphaned);
    }

    /// Broadcasts device data to every attached client.
    fn on_device_data(&self, session: SessionId, port: &PortId, bytes: Vec<u8>) {
        match self.registry.session(port) {
            Some(current) if current.id() == session => {}
            _ => {
                trace!(port = %port, "Data from a closed session dropped");
                return;
            }
        }

        let text = match Response::Data(bytes).encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(port = %port, error = %e, "Failed to encode device data");
                return;
            }
        };

        for client in self.registry.attached_clients(port) {
            if let Err(e) = client.send_text(text.clone()) {
                debug!(client_id = %client.id(), error = %e, "Broadcast delivery failed");
            }
        }
    }

    /// Tears down a session whose device went away.
    fn on_device_lost(&mut self, session: SessionId, port: &PortId, reason: String) {
        match self.registry.session(port) {
            Some(current) if current.id() == session => {}
            _ => return,
        }

        let Some((lost, clients)) = self.registry.remove_session(port) else {
            return;
        };

        let error = Error::device_lost(port.clone(), reason);
        warn!(port = %port, clients = clients.len(), error = %error, "Serial session lost");

        let response = Response::from_error(&error);
        for client in clients {
            self.reply(client, response.clone());
        }

        self.close_sessions(vec![lost]);
    }
}

// ============================================================================
// Dispatcher - Requests
// ============================================================================

impl Dispatcher {
    /// Replies with the names of available ports.
    async fn list(&self, client: ClientId) -> Result<()> {
        let ports = self.backend.list_ports().await?;
        let names = ports.into_iter().map(|p| p.name).collect();
        self.reply(client, Response::List(names));
        Ok(())
    }

    /// Opens `port` or attaches to its existing session.
    async fn open_serial(&mut self, client: ClientId, request: OpenSerialRequest) -> Result<()> {
        let OpenSerialRequest { port, options } = request;

        if let Some(session) = self.registry.session(&port) {
            if session.options() != &options {
                debug!(port = %port, "Port already open, requested options ignored");
            }

            match self.registry.attach(client, &port) {
                Ok(()) => {
                    info!(port = %port, client_id = %client, "Client attached to open port");
                    self.reply(client, Response::opened());
                }
                Err(e @ Error::AlreadyOpen { .. }) => {
                    warn!(port = %port, client_id = %client, "Serial port already open");
                    self.reply_error(client, &e);
                    if self.options.legacy_double_ack {
                        self.reply(client, Response::opened());
                    }
                }
                Err(e) => return Err(e),
            }
            return Ok(());
        }

        if let Some(previous) = self.closing.remove(&port) {
            debug!(port = %port, "Waiting for previous close before reopening");
            if let Err(e) = previous.await {
                warn!(port = %port, error = %e, "Previous close task failed");
            }
        }

        let session = SerialSession::open(
            self.backend.as_ref(),
            port,
            options,
            self.events.clone(),
            self.options.read_buffer,
        )
        .await?;

        self.registry.insert_session(session, client)?;
        self.reply(client, Response::opened());
        Ok(())
    }

    /// Writes to the target port.
    fn write(&self, client: ClientId, request: WriteRequest) -> Result<()> {
        let WriteRequest { port, bytes } = request;

        let target = match port {
            Some(port) if self.registry.is_attached(client, &port) => port,
            Some(port) => return Err(Error::port_not_open(port)),
            None => match self.registry.opened_ports(client) {
                [] => {
                    debug!(client_id = %client, "Write without an open port ignored");
                    return Ok(());
                }
                [only] => only.clone(),
                many => return Err(Error::ambiguous_target(many.len())),
            },
        };

        let session = self
            .registry
            .session(&target)
            .ok_or_else(|| Error::port_not_open(target.clone()))?;

        trace!(port = %target, client_id = %client, bytes = bytes.len(), "Write");
        session.write(bytes)
    }

    /// Detaches from the target port, or from every port.
    fn close(&mut self, client: ClientId, request: CloseRequest) -> Result<()> {
        let orphaned: Vec<SerialSession> = match request.port {
            Some(port) => self.registry.detach(client, &port)?.into_iter().collect(),
            None => self.registry.detach_all(client),
        };

        self.close_sessions(orphaned);
        Ok(())
    }
}

// ============================================================================
// Dispatcher - Helpers
// ============================================================================

impl Dispatcher {
    /// Starts closing sessions removed from the registry.
    ///
    /// Close results are only logged, by the session itself.
    fn close_sessions(&mut self, sessions: Vec<SerialSession>) {
        self.closing.retain(|_, task| !task.is_finished());

        let close_timeout = self.options.close_timeout;
        for mut session in sessions {
            let port = session.port().clone();
            let task = tokio::spawn(async move { session.close(close_timeout).await });
            self.closing.insert(port, task);
        }
    }

    /// Waits for every device close still running.
    async fn finish_closing(&mut self) {
        let tasks: Vec<(PortId, JoinHandle<()>)> = self.closing.drain().collect();
        for (port, task) in tasks {
            if let Err(e) = task.await {
                warn!(port = %port, error = %e, "Close task failed");
            }
        }
    }

    /// Sends a frame to one client; delivery failures are logged.
    fn reply(&self, client: ClientId, response: Response) {
        let Some(handle) = self.registry.client(client) else {
            return;
        };

        if let Err(e) = handle.send(&response) {
            debug!(client_id = %client, error = %e, "Reply dropped");
        }
    }

    /// Sends an `error` frame to one client.
    fn reply_error(&self, client: ClientId, error: &Error) {
        self.reply(client, Response::from_error(error));
    }
}

// ============================================================================
// Tests
// ============================================================================
