//! Type-safe identifiers.
//!
//! Newtype wrappers keep generations, listener handles and exchange tickets
//! from being mixed up with each other or with plain integers.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`ConnectionId`] | Correlates log lines of one connection |
//! | [`Generation`] | Tags transport work with the start/stop epoch it belongs to |
//! | [`ListenerId`] | Handle returned when registering a listener |
//! | [`ExchangeTicket`] | Generation plus sequence number of one exchange |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ConnectionId
// ============================================================================

/// Unique identifier for a connection instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a new random connection ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Start/stop epoch of a connection.
///
/// Bumped on every `start()` and `stop()`. Reports carrying an older
/// generation are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    /// The generation of a freshly constructed connection.
    pub const INITIAL: Self = Self(0);

    /// Returns the following generation.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Global counter for listener IDs.
static LISTENER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Handle identifying a registered listener.
///
/// Pass it to [`Connection::remove_listener`](crate::Connection::remove_listener)
/// to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates the next listener ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(LISTENER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ExchangeTicket
// ============================================================================

/// Provenance tag for one exchange.
///
/// Issued when an exchange begins. The core applies a result only if its
/// ticket belongs to the current generation and its sequence number is newer
/// than the last applied one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExchangeTicket {
    /// Generation the exchange was started in.
    pub generation: Generation,
    /// Monotonic sequence number within the connection.
    pub seq: u64,
}

impl fmt::Display for ExchangeTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.generation, self.seq)
    }
}

// ============================================================================
// Tests
// ============================================================================
