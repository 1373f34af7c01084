//! Builder pattern for connection configuration.
//!
//! Provides a fluent API for configuring and creating [`Connection`]
//! instances with one of the built-in transports.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use teleop_link::{Connection, PollingOptions};
//!
//! # fn example() -> teleop_link::Result<()> {
//! let conn = Connection::builder()
//!     .polling("http://192.168.4.1/joystick")
//!     .polling_options(PollingOptions::new().with_request_timeout(Duration::from_secs(1)))
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! Custom transports skip the builder and use
//! [`Connection::with_driver`].

// ============================================================================
// Imports
// ============================================================================

use url::Url;

use crate::error::{Error, Result};
use crate::transport::{
    PollingDriver, PollingOptions, StreamingDriver, StreamingOptions, TransportDriver,
};

use super::handle::Connection;

// ============================================================================
// TransportKind
// ============================================================================

/// Built-in transport selected on the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportKind {
    /// HTTP request/response.
    Polling,
    /// Persistent WebSocket.
    Streaming,
}

// ============================================================================
// ConnectionBuilder
// ============================================================================

/// Builder for configuring a [`Connection`].
///
/// Use [`Connection::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ConnectionBuilder {
    /// Selected transport and its endpoint.
    endpoint: Option<(TransportKind, String)>,
    /// Polling transport options.
    polling: PollingOptions,
    /// Streaming transport options.
    streaming: StreamingOptions,
}

// ============================================================================
// ConnectionBuilder Implementation
// ============================================================================

impl ConnectionBuilder {
    /// Creates a new builder with no transport selected.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the HTTP polling transport.
    ///
    /// # Arguments
    ///
    /// * `url` - Device endpoint (e.g., "http://192.168.4.1/joystick")
    #[inline]
    #[must_use]
    pub fn polling(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some((TransportKind::Polling, url.into()));
        self
    }

    /// Selects the WebSocket streaming transport.
    ///
    /// # Arguments
    ///
    /// * `url` - Device endpoint (e.g., "ws://192.168.4.1:81/")
    #[inline]
    #[must_use]
    pub fn streaming(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some((TransportKind::Streaming, url.into()));
        self
    }

    /// Sets options used when the polling transport is selected.
    #[inline]
    #[must_use]
    pub fn polling_options(mut self, options: PollingOptions) -> Self {
        self.polling = options;
        self
    }

    /// Sets options used when the streaming transport is selected.
    #[inline]
    #[must_use]
    pub fn streaming_options(mut self, options: StreamingOptions) -> Self {
        self.streaming = options;
        self
    }

    /// Builds a disabled connection.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no transport was selected, the URL scheme does
    ///   not match the transport, or the options are invalid
    /// - [`Error::InvalidUrl`] if the URL cannot be parsed
    pub fn build(self) -> Result<Connection> {
        let driver = self.build_driver()?;
        Ok(Connection::from_boxed(driver))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionBuilder {
    /// Resolves the selected transport into a driver.
    fn build_driver(self) -> Result<Box<dyn TransportDriver>> {
        let (kind, raw) = self.endpoint.ok_or_else(|| {
            Error::config(
                "A transport is required. Use .polling() or .streaming() to select one.\n\
                 Example: Connection::builder().streaming(\"ws://192.168.4.1:81/\")",
            )
        })?;

        let url = Url::parse(raw.trim())?;

        match kind {
            TransportKind::Polling => Ok(Box::new(PollingDriver::new(url, self.polling)?)),
            TransportKind::Streaming => Ok(Box::new(StreamingDriver::new(url, self.streaming)?)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
