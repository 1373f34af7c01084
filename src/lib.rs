//! Teleop Link - Buffered asynchronous link to a remote control device.
//!
//! This library keeps a small, fast-changing command value (a joystick
//! position, a set of motor targets) flowing to a device and the device's
//! latest telemetry flowing back, over either HTTP polling or a WebSocket.
//!
//! # Architecture
//!
//! The connection follows a latest-value-wins model:
//!
//! - **Producer**: Writes the outbound slot whenever input changes; never blocks
//! - **Transport**: Background task that sends the current slot and stores replies
//! - **Consumer**: Reads the inbound slot and health, or subscribes to changes
//!
//! Key design principles:
//!
//! - Values written faster than the link can carry them are coalesced
//! - Every result is tagged with a start/stop generation; stale results are dropped
//! - Transport failures become [`ConnectionState::Error`], never a panic or `Err`
//! - Reconnection follows the transport's [`RetryPolicy`]
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use teleop_link::{Connection, ConnectionState, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Build a connection over a WebSocket
//!     let conn = Connection::builder()
//!         .streaming("ws://192.168.4.1:81/")
//!         .build()?;
//!
//!     conn.on_state_change(|new, old| println!("link: {old} -> {new}"));
//!
//!     // Start the link and wait for it to come up
//!     conn.start()?;
//!     conn.wait_for_state(ConnectionState::Connected, Duration::from_secs(5)).await?;
//!
//!     // Push commands, read telemetry
//!     conn.set_structured_value(&serde_json::json!({ "x": 0.0, "y": 0.5 }))?;
//!     println!("telemetry: {:?}", conn.inbound_value());
//!
//!     conn.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | [`Connection`] handle, state and payload types |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`transport`] | Polling and streaming drivers |
//!
//! # Logging
//!
//! All events are emitted through [`tracing`] with a `connection_id` field.
//! The library never installs a subscriber.

// ============================================================================
// Modules
// ============================================================================

/// Connection handle and state machine.
///
/// Use [`Connection::builder()`] to create a configured connection.
pub mod connection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for connection entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Transport drivers.
///
/// Built-in HTTP polling and WebSocket streaming, plus the
/// [`TransportDriver`] trait for custom transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Connection types
pub use connection::{
    Connection, ConnectionBuilder, ConnectionState, Health, OutboundValue, Payload,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, ExchangeTicket, Generation, ListenerId};

// Transport types
pub use transport::{
    Exchange, LinkContext, PingMode, PollingDriver, PollingOptions, RetryPolicy,
    StreamingDriver, StreamingOptions, TransportDriver,
};
