//! Serial server coordinator.
//!
//! [`SerialServer`] holds the configuration and backend; [`SerialServer::start`]
//! binds the listener and spawns two tasks:
//!
//! - the accept loop, which turns connections into dispatcher events
//! - the dispatcher, which owns every session and client
//!
//! # Example
//!
//! ```no_run
//! use serial_bridge::SerialServer;
//!
//! # async fn example() -> serial_bridge::Result<()> {
//! let running = SerialServer::builder().port(0).build()?.start().await?;
//! println!("listening on {}", running.ws_url());
//! running.stop().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::device::{PortInfo, SerialBackend};
use crate::dispatch::{self, Dispatcher};
use crate::error::Result;
use crate::transport::Listener;

use super::builder::SerialServerBuilder;
use super::config::ServerConfig;

// ============================================================================
// SerialServer
// ============================================================================

/// A configured, not yet listening server.
pub struct SerialServer {
    /// Settings.
    config: ServerConfig,
    /// Device backend.
    backend: Arc<dyn SerialBackend>,
}

impl fmt::Debug for SerialServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SerialServer {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SerialServerBuilder {
        SerialServerBuilder::new()
    }

    /// Creates a server from validated settings.
    pub(crate) fn new(config: ServerConfig, backend: Arc<dyn SerialBackend>) -> Self {
        Self { config, backend }
    }

    /// Returns the settings.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Enumerates the ports the backend can open.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Enumeration`] if enumeration fails.
    pub async fn list_ports(&self) -> Result<Vec<PortInfo>> {
        self.backend.list_ports().await
    }

    /// Binds the listener and starts serving.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if binding fails.
    pub async fn start(self) -> Result<RunningServer> {
        let listener = Listener::bind(self.config.host, self.config.port).await?;
        let local_addr = listener.local_addr();
        let ws_url = listener.ws_url();

        let (events_tx, events_rx) = dispatch::channel();
        let dispatcher = Dispatcher::new(
            self.backend,
            events_tx.clone(),
            self.config.dispatch_options(),
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let dispatcher_task = tokio::spawn(dispatcher.run(events_rx, shutdown_rx));

        let accept_shutdown = Arc::new(AtomicBool::new(false));
        let accept_task = tokio::spawn(listener.accept_loop(events_tx, Arc::clone(&accept_shutdown)));

        info!(url = %ws_url, "Serial server listening");

        Ok(RunningServer {
            local_addr,
            ws_url,
            shutdown_tx: Some(shutdown_tx),
            accept_shutdown,
            dispatcher_task: Some(dispatcher_task),
            accept_task: Some(accept_task),
        })
    }
}

// ============================================================================
// RunningServer
// ============================================================================

/// A listening server.
///
/// Dropping it without calling [`RunningServer::stop`] still shuts the
/// server down, without waiting for devices to close.
pub struct RunningServer {
    /// Bound address.
    local_addr: SocketAddr,
    /// URL clients connect to.
    ws_url: String,
    /// Signals the dispatcher to stop.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Signals the accept loop to stop.
    accept_shutdown: Arc<AtomicBool>,
    /// Dispatcher task.
    dispatcher_task: Option<JoinHandle<()>>,
    /// Accept loop task.
    accept_task: Option<JoinHandle<()>>,
}

impl fmt::Debug for RunningServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningServer")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl RunningServer {
    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the URL clients connect to.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Stops the server.
    ///
    /// Every open session is flushed and closed, then every client
    /// connection, then the listener.
    pub async fn stop(mut self) {
        info!("Serial server stopping");

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.dispatcher_task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Dispatcher task failed");
        }

        self.accept_shutdown.store(true, Ordering::SeqCst);
        if let Some(task) = self.accept_task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Accept task failed");
        }

        info!("Serial server stopped");
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some() {
            debug!("Serial server dropped without stop");
        }
        self.accept_shutdown.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Tests
// ============================================================================
