//! Open device handle and its I/O task.
//!
//! Each open device is driven by one tokio task that owns the stream:
//!
//! - Bytes read from the device are forwarded to the dispatcher queue as
//!   [`DeviceEvent::Data`]
//! - Writes and the close request arrive over a command channel
//! - An unexpected end of stream or read error is reported once as
//!   [`DeviceEvent::Lost`]
//!
//! Closing drains pending output and flushes before the stream is shut down
//! and dropped. The whole close is bounded by a timeout enforced inside the
//! task, so a stalled device still releases its stream.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::dispatch::{DEFAULT_CLOSE_TIMEOUT, Event, EventSender};
use crate::error::{Error, Result};
use crate::identifiers::{PortId, SessionId};

use super::backend::PortStream;

// ============================================================================
// DeviceEvent
// ============================================================================

/// Events produced by a device task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Bytes were read from the device.
    Data {
        /// Session incarnation that owns the device.
        session: SessionId,
        /// Port the bytes came from.
        port: PortId,
        /// The bytes.
        bytes: Vec<u8>,
    },

    /// The device stopped unexpectedly.
    Lost {
        /// Session incarnation that owned the device.
        session: SessionId,
        /// Port that went away.
        port: PortId,
        /// Reason reported by the stream.
        reason: String,
    },
}

// ============================================================================
// DeviceCommand
// ============================================================================

/// Internal commands for the device task.
enum DeviceCommand {
    /// Queue bytes for the device.
    Write(Vec<u8>),
    /// Drain, flush and close the device within `timeout`.
    Close {
        timeout: Duration,
        done: oneshot::Sender<Result<()>>,
    },
}

/// Why the event loop stopped.
enum LoopExit {
    /// Close requested; `done` is absent when nobody waits for the result.
    Close {
        timeout: Duration,
        done: Option<oneshot::Sender<Result<()>>>,
    },
    /// The device went away on its own.
    Lost,
}

// ============================================================================
// DeviceHandle
// ============================================================================

/// Handle to an open device.
///
/// Dropping the handle without calling [`DeviceHandle::close`] still closes
/// the device, without waiting for the result.
#[derive(Debug)]
pub struct DeviceHandle {
    /// Port name for logging and errors.
    port: PortId,
    /// Channel to the device task.
    command_tx: mpsc::UnboundedSender<DeviceCommand>,
    /// Set once a close has been requested.
    closed: bool,
}

impl std::fmt::Debug for DeviceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Write(bytes) => f.debug_tuple("Write").field(&bytes.len()).finish(),
            Self::Close { timeout, .. } => f.debug_struct("Close").field("timeout", timeout).finish(),
        }
    }
}

impl DeviceHandle {
    /// Takes ownership of an open stream and spawns its I/O task.
    pub(crate) fn spawn(
        session: SessionId,
        port: PortId,
        stream: Box<dyn PortStream>,
        events: EventSender,
        read_buffer: usize,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_event_loop(
            session,
            port.clone(),
            stream,
            command_rx,
            events,
            read_buffer.max(1),
        ));

        Self {
            port,
            command_tx,
            closed: false,
        }
    }

    /// Creates a handle with no task behind it.
    #[cfg(test)]
    pub(crate) fn detached(port: PortId) -> Self {
        let (command_tx, _) = mpsc::unbounded_channel();
        Self {
            port,
            command_tx,
            closed: false,
        }
    }

    /// Returns `true` until a close has been requested.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Queues bytes for transmission.
    ///
    /// Never waits for the device: bytes the device has not accepted yet stay
    /// queued in the device task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceLost`] if the device task has stopped.
    pub fn write(&self, bytes: Vec<u8>) -> Result<()> {
        if self.closed {
            return Err(Error::port_not_open(self.port.clone()));
        }

        self.command_tx
            .send(DeviceCommand::Write(bytes))
            .map_err(|_| Error::device_lost(self.port.clone(), "device task stopped"))
    }

    /// Drains queued output, flushes and closes the device.
    ///
    /// Idempotent: calls after the first return `Ok(())` immediately. A device
    /// whose task already stopped counts as closed. The stream is released
    /// when this returns, whether or not the close succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceClose`] if draining, flushing or closing fails
    /// or does not finish within `close_timeout`.
    pub async fn close(&mut self, close_timeout: Duration) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let (done, done_rx) = oneshot::channel();
        let command = DeviceCommand::Close {
            timeout: close_timeout,
            done,
        };
        if self.command_tx.send(command).is_err() {
            debug!(port = %self.port, "Device task already stopped");
            return Ok(());
        }

        done_rx.await.unwrap_or(Ok(()))
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if !self.closed {
            let (done, _) = oneshot::channel();
            let _ = self.command_tx.send(DeviceCommand::Close {
                timeout: DEFAULT_CLOSE_TIMEOUT,
                done,
            });
        }
    }
}

// ============================================================================
// DeviceHandle - Event Loop
// ============================================================================

impl DeviceHandle {
    /// Task that owns the device stream.
    ///
    /// Output is written from a pending buffer inside the same `select!`, so
    /// a device that stops accepting bytes never stops reads or close
    /// requests from being served.
    async fn run_event_loop(
        session: SessionId,
        port: PortId,
        stream: Box<dyn PortStream>,
        mut command_rx: mpsc::UnboundedReceiver<DeviceCommand>,
        events: EventSender,
        read_buffer: usize,
    ) {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut buf = vec![0u8; read_buffer];
        let mut pending: Vec<u8> = Vec::new();

        let exit = loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    let reason = match read {
                        Ok(0) => "device reached end of stream".to_string(),
                        Ok(n) => {
                            trace!(port = %port, bytes = n, "Device data");
                            let event = DeviceEvent::Data {
                                session,
                                port: port.clone(),
                                bytes: buf[..n].to_vec(),
                            };
                            if events.send(Event::Device(event)).is_err() {
                                debug!(port = %port, "Dispatcher gone, closing device");
                                break LoopExit::Close {
                                    timeout: DEFAULT_CLOSE_TIMEOUT,
                                    done: None,
                                };
                            }
                            continue;
                        }
                        Err(e) => e.to_string(),
                    };

                    warn!(port = %port, reason = %reason, "Serial device lost");
                    let _ = events.send(Event::Device(DeviceEvent::Lost {
                        session,
                        port: port.clone(),
                        reason,
                    }));
                    break LoopExit::Lost;
                }

                written = writer.write(&pending), if !pending.is_empty() => {
                    match written {
                        Ok(0) => {
                            warn!(port = %port, dropped = pending.len(), "Serial device accepted no bytes");
                            pending.clear();
                        }
                        Ok(n) => {
                            pending.drain(..n);
                        }
                        Err(e) => {
                            warn!(port = %port, error = %e, dropped = pending.len(), "Serial write failed");
                            pending.clear();
                        }
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(DeviceCommand::Write(bytes)) => pending.extend_from_slice(&bytes),

                        Some(DeviceCommand::Close { timeout, done }) => {
                            break LoopExit::Close {
                                timeout,
                                done: Some(done),
                            };
                        }

                        None => {
                            break LoopExit::Close {
                                timeout: DEFAULT_CLOSE_TIMEOUT,
                                done: None,
                            };
                        }
                    }
                }
            }
        };

        match exit {
            LoopExit::Close { timeout: limit, done } => {
                let result = match timeout(limit, Self::shutdown(&mut writer, &pending, &port)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::device_close(
                        port.clone(),
                        format!("timed out after {}ms", limit.as_millis()),
                    )),
                };
                drop(reader);
                drop(writer);
                if let Some(done) = done {
                    let _ = done.send(result);
                }
            }

            LoopExit::Lost => {
                drop(reader);
                drop(writer);

                // Keep answering close requests until the handle is gone.
                while let Some(command) = command_rx.recv().await {
                    if let DeviceCommand::Close { done, .. } = command {
                        let _ = done.send(Ok(()));
                        break;
                    }
                }
            }
        }

        debug!(port = %port, "Device task terminated");
    }

    /// Writes what is still queued, flushes and shuts the stream down.
    async fn shutdown(
        writer: &mut WriteHalf<Box<dyn PortStream>>,
        pending: &[u8],
        port: &PortId,
    ) -> Result<()> {
        writer
            .write_all(pending)
            .await
            .map_err(|e| Error::device_close(port.clone(), format!("drain failed: {e}")))?;

        writer
            .flush()
            .await
            .map_err(|e| Error::device_close(port.clone(), format!("flush failed: {e}")))?;

        writer
            .shutdown()
            .await
            .map_err(|e| Error::device_close(port.clone(), e.to_string()))?;

        debug!(port = %port, "Serial device closed");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::io::Builder;

    use crate::device::{MockBackend, SerialBackend};
    use crate::dispatch::{EventReceiver, channel};
    use crate::protocol::SerialOptions;

    const WAIT: Duration = Duration::from_secs(2);

    fn port(name: &str) -> PortId {
        PortId::new(name).expect("valid port")
    }

    async fn next_device_event(rx: &mut EventReceiver) -> DeviceEvent {
        match timeout(WAIT, rx.recv()).await {
            Ok(Some(Event::Device(event))) => event,
            other => panic!("expected device event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reads_forwarded_then_loss_reported() {
        let stream = Builder::new().read(b"hello").build();
        let (tx, mut rx) = channel();
        let session = SessionId::next();
        let mut handle = DeviceHandle::spawn(session, port("COM1"), Box::new(stream), tx, 64);

        assert_eq!(
            next_device_event(&mut rx).await,
            DeviceEvent::Data {
                session,
                port: port("COM1"),
                bytes: b"hello".to_vec(),
            }
        );

        let DeviceEvent::Lost { session: lost, .. } = next_device_event(&mut rx).await else {
            panic!("expected loss after end of stream");
        };
        assert_eq!(lost, session);

        handle.close(WAIT).await.expect("close after loss");
    }

    #[tokio::test]
    async fn test_write_and_close() {
        let backend = MockBackend::new();
        let stream = backend
            .open(&port("COM2"), &SerialOptions::default())
            .await
            .expect("open");
        let mut device = backend.take_device("COM2").expect("device end");
        let (tx, _rx) = channel();
        let mut handle = DeviceHandle::spawn(SessionId::next(), port("COM2"), stream, tx, 64);

        handle.write(b"abc".to_vec()).expect("queued");
        assert_eq!(device.expect_written(3).await.expect("read"), b"abc");

        handle.write(b"tail".to_vec()).expect("queued");
        handle.close(WAIT).await.expect("close");
        assert!(!handle.is_open());
        assert_eq!(backend.close_count("COM2"), 1);
        assert_eq!(device.wait_closed().await.expect("drained"), b"tail");

        handle.close(WAIT).await.expect("second close is a no-op");
        assert_eq!(backend.close_count("COM2"), 1);
    }

    #[tokio::test]
    async fn test_write_after_close_rejected() {
        let stream = Builder::new().build();
        let (tx, _rx) = channel();
        let mut handle = DeviceHandle::spawn(SessionId::next(), port("COM3"), Box::new(stream), tx, 64);

        handle.close(WAIT).await.expect("close");
        let err = handle.write(vec![1]).expect_err("closed");
        assert!(matches!(err, Error::PortNotOpen { .. }));
    }

    #[tokio::test]
    async fn test_reads_continue_while_write_stalled() {
        let backend = MockBackend::new();
        let stream = backend
            .open(&port("COM4"), &SerialOptions::default())
            .await
            .expect("open");
        let mut device = backend.take_device("COM4").expect("device end");
        let (tx, mut rx) = channel();
        let session = SessionId::next();
        let mut handle = DeviceHandle::spawn(session, port("COM4"), stream, tx, 64);

        // Nobody reads the device end, so the pipe fills up.
        handle.write(vec![b'x'; 200 * 1024]).expect("queued");
        device.emit(b"ping").await.expect("emit");

        assert_eq!(
            next_device_event(&mut rx).await,
            DeviceEvent::Data {
                session,
                port: port("COM4"),
                bytes: b"ping".to_vec(),
            }
        );

        let err = timeout(WAIT, handle.close(Duration::from_millis(100)))
            .await
            .expect("close bounded by its timeout")
            .expect_err("stalled drain");
        assert!(matches!(err, Error::DeviceClose { .. }));
        assert_eq!(backend.close_count("COM4"), 0);

        // The server end is released even though the close failed.
        let rest = timeout(WAIT, device.wait_closed())
            .await
            .expect("server end dropped")
            .expect("read");
        assert!(rest.iter().all(|&b| b == b'x'));
    }

    #[tokio::test]
    async fn test_close_failure_reported() {
        let backend = MockBackend::new();
        backend.fail_close("COM5", "Input/output error");
        let stream = backend
            .open(&port("COM5"), &SerialOptions::default())
            .await
            .expect("open");
        let (tx, _rx) = channel();
        let mut handle = DeviceHandle::spawn(SessionId::next(), port("COM5"), stream, tx, 64);

        let err = handle.close(WAIT).await.expect_err("shutdown fails");
        assert!(matches!(err, Error::DeviceClose { .. }));
        assert!(err.to_string().contains("Input/output error"));
        assert_eq!(backend.close_count("COM5"), 0);
        assert!(!handle.is_open());
    }
}
