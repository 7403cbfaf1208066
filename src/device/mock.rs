//! In-memory backend for tests and benchmarks.
//!
//! Each open hands the server one end of a `tokio::io::duplex` pipe and keeps
//! the other end as a [`MockDevice`], which plays the hardware: it can emit
//! bytes, read what the server wrote, or be unplugged by dropping it.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

use crate::error::{Error, Result};
use crate::identifiers::PortId;
use crate::protocol::SerialOptions;

use super::backend::{PortInfo, PortStream, SerialBackend};

// ============================================================================
// Constants
// ============================================================================

/// Capacity of each in-memory pipe.
const PIPE_CAPACITY: usize = 64 * 1024;

// ============================================================================
// MockBackend
// ============================================================================

/// Backend that simulates serial devices in memory.
#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Ports reported by `list_ports`.
    ports: Vec<String>,
    /// Ports whose next opens fail with the given reason.
    failures: FxHashMap<String, String>,
    /// Ports whose streams fail to shut down with the given reason.
    close_failures: FxHashMap<String, String>,
    /// Number of successful opens per port.
    opens: FxHashMap<String, usize>,
    /// Close counters per port, shared with the streams.
    closes: FxHashMap<String, Arc<AtomicUsize>>,
    /// Device ends not yet taken by the test.
    devices: FxHashMap<String, MockDevice>,
    /// Options used for the latest open per port.
    options: FxHashMap<String, SerialOptions>,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("MockBackend")
            .field("ports", &state.ports)
            .field("opens", &state.opens)
            .finish_non_exhaustive()
    }
}

impl MockBackend {
    /// Creates a backend with no listed ports.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that lists the given ports.
    #[must_use]
    pub fn with_ports(ports: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let backend = Self::new();
        backend.inner.lock().ports = ports.into_iter().map(Into::into).collect();
        backend
    }

    /// Makes opens of `port` fail with `reason`.
    pub fn fail_open(&self, port: &str, reason: impl Into<String>) {
        self.inner
            .lock()
            .failures
            .insert(port.to_string(), reason.into());
    }

    /// Lets opens of `port` succeed again.
    pub fn clear_failure(&self, port: &str) {
        self.inner.lock().failures.remove(port);
    }

    /// Makes streams opened from now on for `port` fail to shut down.
    pub fn fail_close(&self, port: &str, reason: impl Into<String>) {
        self.inner
            .lock()
            .close_failures
            .insert(port.to_string(), reason.into());
    }

    /// Returns how many times `port` was opened successfully.
    #[must_use]
    pub fn open_count(&self, port: &str) -> usize {
        self.inner.lock().opens.get(port).copied().unwrap_or(0)
    }

    /// Returns how many times a stream of `port` was shut down.
    #[must_use]
    pub fn close_count(&self, port: &str) -> usize {
        self.inner
            .lock()
            .closes
            .get(port)
            .map_or(0, |count| count.load(Ordering::SeqCst))
    }

    /// Returns the options of the latest open of `port`.
    #[must_use]
    pub fn last_options(&self, port: &str) -> Option<SerialOptions> {
        self.inner.lock().options.get(port).cloned()
    }

    /// Takes the device end of the latest open of `port`.
    #[must_use]
    pub fn take_device(&self, port: &str) -> Option<MockDevice> {
        self.inner.lock().devices.remove(port)
    }
}

#[async_trait]
impl SerialBackend for MockBackend {
    async fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let state = self.inner.lock();
        Ok(state.ports.iter().map(PortInfo::new).collect())
    }

    async fn open(&self, port: &PortId, options: &SerialOptions) -> Result<Box<dyn PortStream>> {
        let mut state = self.inner.lock();
        let name = port.as_str().to_string();

        if let Some(reason) = state.failures.get(&name) {
            return Err(Error::device_open(port.clone(), reason.clone()));
        }

        let (server_end, device_end) = tokio::io::duplex(PIPE_CAPACITY);
        let closes = Arc::clone(state.closes.entry(name.clone()).or_default());
        let close_failure = state.close_failures.get(&name).cloned();

        *state.opens.entry(name.clone()).or_default() += 1;
        state.options.insert(name.clone(), options.clone());
        state
            .devices
            .insert(name, MockDevice { stream: device_end });

        Ok(Box::new(MockStream {
            inner: server_end,
            closes,
            close_failure,
        }))
    }
}

// ============================================================================
// MockStream
// ============================================================================

/// Server end of a simulated device; counts shutdowns.
struct MockStream {
    inner: DuplexStream,
    closes: Arc<AtomicUsize>,
    close_failure: Option<String>,
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(reason) = &self.close_failure {
            return Poll::Ready(Err(io::Error::other(reason.clone())));
        }
        let result = Pin::new(&mut self.inner).poll_shutdown(cx);
        if let Poll::Ready(Ok(())) = result {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

// ============================================================================
// MockDevice
// ============================================================================

/// Hardware side of a simulated device.
///
/// Dropping it unplugs the device.
#[derive(Debug)]
pub struct MockDevice {
    stream: DuplexStream,
}

impl MockDevice {
    /// Emits bytes as if received on the serial line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the server end is gone.
    pub async fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Reads exactly `len` bytes written by the server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the server end closes first.
    pub async fn expect_written(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Waits until the server closes its end, returning any trailing bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on read failure.
    pub async fn wait_closed(&mut self) -> Result<Vec<u8>> {
        let mut rest = Vec::new();
        self.stream.read_to_end(&mut rest).await?;
        Ok(rest)
    }
}

// ============================================================================
// Tests
// ============================================================================
