//! Connection state and health snapshot.
//!
//! # State Machine
//!
//! ```text
//!                 start()
//!  Disconnected ──────────► Connecting ◄──────────┐
//!       ▲                    │     ▲               │ retry
//!       │ stop()   link up / │     │ success       │
//!       │ (from any state)   ▼     │ while Error   │
//!       │                 Connected ──► Error ─────┘
//!       │                   failure      ▲
//!       └────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ============================================================================
// ConnectionState
// ============================================================================

/// Transport status of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Stopped, or never started.
    #[default]
    Disconnected,
    /// Transport is attempting to establish communication.
    Connecting,
    /// At least one exchange completed, or the link is confirmed live.
    Connected,
    /// A recoverable failure occurred; see `last_error`.
    Error,
}

impl ConnectionState {
    /// All states, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Disconnected,
        Self::Connecting,
        Self::Connected,
        Self::Error,
    ];

    /// Returns the stable lowercase name of the state.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Returns `true` if the link is live.
    #[inline]
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if transport activity is expected in this state.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Returns `true` if the state machine has an edge `self -> next`.
    ///
    /// Self-loops are excluded; they are no-ops, not transitions.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Disconnected, Self::Connecting) => true,
            (Self::Connecting, Self::Connected) => true,
            (Self::Connecting | Self::Connected, Self::Error) => true,
            (Self::Error, Self::Connecting) => true,
            (Self::Connecting | Self::Connected | Self::Error, Self::Disconnected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Health
// ============================================================================

/// Point-in-time view of a connection's health.
///
/// All fields are read under one lock, so the snapshot is consistent:
/// `last_error` is `Some` exactly when `state` is [`ConnectionState::Error`].
#[derive(Debug, Clone)]
pub struct Health {
    /// Current state.
    pub state: ConnectionState,
    /// Whether transport activity is enabled.
    pub enabled: bool,
    /// Cause of the current `Error` state.
    pub last_error: Option<Arc<Error>>,
    /// Latency of the most recently completed exchange.
    pub round_trip: Option<Duration>,
}

impl Health {
    /// Returns the round-trip latency in whole milliseconds.
    #[inline]
    #[must_use]
    pub fn round_trip_ms(&self) -> Option<u64> {
        self.round_trip.map(|d| d.as_millis() as u64)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(!ConnectionState::default().is_active());
    }

    #[test]
    fn test_names() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Error.as_str(), "error");
        let json = serde_json::to_string(&ConnectionState::Connecting).unwrap();
        assert_eq!(json, "\"connecting\"");
    }

    #[test]
    fn test_transition_table() {
        use ConnectionState::*;

        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Error));
        assert!(Error.can_transition_to(Connecting));
        assert!(Error.can_transition_to(Disconnected));

        assert!(!Error.can_transition_to(Connected));
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Disconnected.can_transition_to(Error));
        for state in ConnectionState::ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_round_trip_ms() {
        let health = Health {
            state: ConnectionState::Connected,
            enabled: true,
            last_error: None,
            round_trip: Some(Duration::from_millis(42)),
        };
        assert_eq!(health.round_trip_ms(), Some(42));
    }
}
