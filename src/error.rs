//! Error types for teleop-link.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Only contract violations reach the caller as [`Error`]. Transport
//! failures are absorbed by the driver and surface through
//! [`ConnectionState::Error`](crate::ConnectionState::Error) and
//! [`Connection::last_error`](crate::Connection::last_error) instead.
//!
//! ```ignore
//! use teleop_link::{Connection, Result};
//!
//! fn push(conn: &Connection, x: f32, y: f32) -> Result<()> {
//!     conn.set_structured_value(&serde_json::json!({ "x": x, "y": y }))?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`] |
//! | Lifecycle | [`Error::Closed`], [`Error::NoRuntime`], [`Error::Timeout`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Exchange | [`Error::RequestTimeout`], [`Error::HttpStatus`], [`Error::PingTimeout`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Http`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned by [`ConnectionBuilder::build`](crate::ConnectionBuilder::build)
    /// when options fail validation.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Connection was closed by its owner.
    ///
    /// Returned by producer operations called after
    /// [`Connection::close`](crate::Connection::close).
    #[error("Connection has been closed")]
    Closed,

    /// `start()` was called outside a tokio runtime.
    #[error("No tokio runtime available to drive the transport")]
    NoRuntime,

    /// A caller-side wait did not complete in time.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Link could not be established or broke down.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Link was not established within the connect timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Remote end closed the link.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Exchange Errors
    // ========================================================================
    /// A polling request received no response in time.
    #[error("Request timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Device answered a polling request with a non-success status.
    #[error("HTTP status {status}")]
    HttpStatus {
        /// Numeric status code returned by the device.
        status: u16,
    },

    /// A ping was not echoed within the ping timeout.
    #[error("Ping {ping_id} not answered within {timeout_ms}ms")]
    PingTimeout {
        /// Sequence number of the unanswered ping.
        ping_id: u64,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(timeout_ms: u64) -> Self {
        Self::RequestTimeout { timeout_ms }
    }

    /// Creates an HTTP status error.
    #[inline]
    pub fn http_status(status: u16) -> Self {
        Self::HttpStatus { status }
    }

    /// Creates a ping timeout error.
    #[inline]
    pub fn ping_timeout(ping_id: u64, timeout_ms: u64) -> Self {
        Self::PingTimeout {
            ping_id,
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::ConnectionTimeout { .. }
            | Self::RequestTimeout { .. }
            | Self::PingTimeout { .. } => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error came from the transport and may clear on
    /// retry.
    ///
    /// Contract violations ([`Error::Closed`], [`Error::Json`], ...) are not
    /// recoverable; they indicate a caller bug.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::RequestTimeout { .. }
                | Self::HttpStatus { .. }
                | Self::PingTimeout { .. }
                | Self::WebSocket(_)
                | Self::Http(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
