//! Public connection handle.
//!
//! A [`Connection`] ties one [`ConnectionCore`] to one
//! [`TransportDriver`](crate::transport::TransportDriver). Producers write
//! the outbound slot and toggle the link; consumers read health and
//! subscribe to changes. Clones share the same connection.
//!
//! # Example
//!
//! ```no_run
//! use teleop_link::{Connection, ConnectionState, Result};
//!
//! # async fn example() -> Result<()> {
//! let conn = Connection::builder()
//!     .streaming("ws://robot.local:9000/control")
//!     .build()?;
//!
//! conn.on_state_change(|new, old| println!("{old} -> {new}"));
//! conn.on_response_data(|telemetry| println!("telemetry: {telemetry}"));
//!
//! conn.start()?;
//! conn.set_structured_value(&serde_json::json!({ "x": 0.2, "y": -0.7 }))?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, ListenerId};
use crate::transport::runner::{self, SharedDriver};
use crate::transport::{LinkContext, TransportDriver};

use super::builder::ConnectionBuilder;
use super::core::ConnectionCore;
use super::payload::{OutboundValue, Payload};
use super::state::{ConnectionState, Health};

// ============================================================================
// ConnectionInner
// ============================================================================

/// Shared state behind every clone of a [`Connection`].
struct ConnectionInner {
    core: Arc<ConnectionCore>,
    driver: SharedDriver,
    transport: &'static str,
    /// Signals the current runner task to tear down.
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl ConnectionInner {
    /// Signals the running task, if any, to stop.
    fn signal_shutdown(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(true);
        }
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        // Last handle gone: stop the runner so it releases the socket.
        self.core.stop();
        self.signal_shutdown();
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Buffered asynchronous link to a remote device.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.core.id())
            .field("transport", &self.inner.transport)
            .field("state", &self.inner.core.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructor
// ============================================================================

impl Connection {
    /// Returns a builder for configuring a connection.
    #[inline]
    #[must_use]
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Creates a disabled connection around a custom driver.
    #[must_use]
    pub fn with_driver(driver: impl TransportDriver) -> Self {
        Self::from_boxed(Box::new(driver))
    }

    /// Creates a disabled connection around a boxed driver.
    pub(crate) fn from_boxed(driver: Box<dyn TransportDriver>) -> Self {
        let id = ConnectionId::generate();
        let transport = driver.name();
        debug!(connection_id = %id, transport, "Connection created");

        Self {
            inner: Arc::new(ConnectionInner {
                core: Arc::new(ConnectionCore::new(id)),
                driver: Arc::new(AsyncMutex::new(driver)),
                transport,
                shutdown: Mutex::new(None),
            }),
        }
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.core.id()
    }

    /// Returns the name of the transport driver.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &'static str {
        self.inner.transport
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Enables the link and begins connecting.
    ///
    /// Returns immediately; the transport runs on a background task. Has no
    /// effect if already started.
    ///
    /// # Errors
    ///
    /// - [`Error::Closed`] after [`close`](Self::close)
    /// - [`Error::NoRuntime`] if called outside a tokio runtime
    pub fn start(&self) -> Result<()> {
        if self.inner.core.is_closed() {
            return Err(Error::Closed);
        }
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let Some(generation) = self.inner.core.start()? else {
            return Ok(());
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        if let Some(previous) = self.inner.shutdown.lock().replace(shutdown_tx) {
            let _ = previous.send(true);
        }

        let link = LinkContext::new(Arc::clone(&self.inner.core), generation);
        runtime.spawn(runner::run(
            Arc::clone(&self.inner.driver),
            link,
            shutdown_rx,
        ));
        Ok(())
    }

    /// Disables the link and forces [`ConnectionState::Disconnected`].
    ///
    /// In-flight transport work is cancelled; its results are discarded even
    /// if they arrive later. Idempotent.
    pub fn stop(&self) {
        self.inner.core.stop();
        self.inner.signal_shutdown();
    }

    /// Stops the connection and drops all listeners.
    ///
    /// Afterwards producer operations return [`Error::Closed`].
    pub fn close(&self) {
        self.stop();
        self.inner.core.close();
    }

    /// Returns `true` if the link is enabled.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.core.is_enabled()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.core.is_closed()
    }
}

// ============================================================================
// Connection - Producer
// ============================================================================

impl Connection {
    /// Replaces the outbound value.
    ///
    /// Strings are sent verbatim, [`serde_json::Value`]s are encoded as
    /// canonical JSON. Never blocks; values written between two transport
    /// cycles are coalesced to the last one.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if a structured value cannot be encoded
    /// - [`Error::Closed`] after [`close`](Self::close)
    pub fn set_outbound_value(&self, value: impl Into<OutboundValue>) -> Result<()> {
        let payload = value.into().encode()?;
        self.inner.core.set_outbound(payload)
    }

    /// Replaces the outbound value with text sent as-is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`close`](Self::close).
    pub fn set_raw_text(&self, text: impl Into<String>) -> Result<()> {
        self.inner.core.set_outbound(Payload::from(text.into()))
    }

    /// Replaces the outbound value with `value` encoded as canonical JSON.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the value cannot be encoded
    /// - [`Error::Closed`] after [`close`](Self::close)
    pub fn set_structured_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let payload = Payload::to_canonical_json(value)?;
        self.inner.core.set_outbound(payload)
    }

    /// Returns the value the next cycle would send.
    #[inline]
    #[must_use]
    pub fn outbound_value(&self) -> Option<Payload> {
        self.inner.core.outbound()
    }
}

// ============================================================================
// Connection - Consumer
// ============================================================================

impl Connection {
    /// Returns the most recent value received from the device.
    ///
    /// Never blocks and never triggers an exchange.
    #[inline]
    #[must_use]
    pub fn inbound_value(&self) -> Option<Payload> {
        self.inner.core.inbound()
    }

    /// Registers a state-change listener, called with `(new, old)`.
    ///
    /// Listeners run synchronously on the task that detected the change, in
    /// registration order.
    pub fn on_state_change(
        &self,
        listener: impl Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.core.on_state_change(listener)
    }

    /// Registers a listener for raw inbound payloads.
    pub fn on_response_data(&self, listener: impl Fn(&str) + Send + Sync + 'static) -> ListenerId {
        self.inner.core.on_response_data(listener)
    }

    /// Removes a listener. Returns `true` if it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.core.remove_listener(id)
    }

    /// Returns a receiver that tracks the current state.
    #[inline]
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.core.watch_state()
    }

    /// Waits until the connection reaches `target`.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if `target` is not reached within `within`
    /// - [`Error::Closed`] if the connection is dropped while waiting
    pub async fn wait_for_state(&self, target: ConnectionState, within: Duration) -> Result<()> {
        let mut rx = self.watch_state();
        match timeout(within, rx.wait_for(|state| *state == target)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => Err(Error::timeout(
                format!("waiting for state {target}"),
                within.as_millis() as u64,
            )),
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.core.state()
    }

    /// Returns the cause of the current [`ConnectionState::Error`].
    #[inline]
    #[must_use]
    pub fn last_error(&self) -> Option<Arc<Error>> {
        self.inner.core.last_error()
    }

    /// Returns the latency of the most recent completed exchange.
    #[inline]
    #[must_use]
    pub fn round_trip(&self) -> Option<Duration> {
        self.inner.core.round_trip()
    }

    /// Returns a consistent snapshot of state, error and latency.
    #[inline]
    #[must_use]
    pub fn health(&self) -> Health {
        self.inner.core.health()
    }
}

// ============================================================================
// Tests
// ============================================================================
