//! Transport drivers.
//!
//! A driver moves values between the connection's buffers and the network.
//! It never touches connection state directly: everything goes through the
//! [`LinkContext`] it is handed, which ties each report to the start/stop
//! generation the driver was launched in.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  set_outbound_value   ┌────────────────┐
//! │  Producer    │──────────────────────►│ ConnectionCore │
//! │  (UI)        │                       │  outbound slot │
//! └──────────────┘                       │  inbound slot  │
//!        ▲        on_state_change /      │  state machine │
//!        └────────on_response_data───────┤                │
//!                                        └───────▲────────┘
//!                                                │ LinkContext
//!                                        ┌───────┴────────┐      network
//!                                        │ runner task    │◄───────────────►
//!                                        │  + driver      │
//!                                        └────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Retry delay policy |
//! | `link` | Driver-facing reporting handle |
//! | `polling` | HTTP request/response driver |
//! | `runner` | Connect / cycle / retry supervision loop |
//! | `streaming` | WebSocket driver |

// ============================================================================
// Submodules
// ============================================================================

/// Retry delay policy.
pub mod backoff;

/// Driver-facing reporting handle.
pub mod link;

/// HTTP request/response polling driver.
pub mod polling;

/// Supervision loop.
pub(crate) mod runner;

/// Persistent WebSocket driver.
pub mod streaming;

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::RetryPolicy;
pub use link::{Exchange, LinkContext};
pub use polling::{PollingDriver, PollingOptions};
pub use streaming::{PingMode, StreamingDriver, StreamingOptions};

// ============================================================================
// TransportDriver
// ============================================================================

/// Send/receive mechanics behind a connection.
///
/// The runner calls [`attempt_connect`](Self::attempt_connect) once per
/// session, then [`cycle_once`](Self::cycle_once) repeatedly until it
/// fails, then [`teardown`](Self::teardown). Errors returned from either of
/// the first two are reported as failures and followed by a retry after the
/// delay given by [`retry_policy`](Self::retry_policy).
///
/// Successful exchanges are reported by the driver itself through
/// [`LinkContext::report_exchange_result`] (and link-up / latency through
/// the other `report_*` methods).
#[async_trait]
pub trait TransportDriver: Send + 'static {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Reconnection schedule for this driver.
    fn retry_policy(&self) -> RetryPolicy;

    /// Establishes the link.
    async fn attempt_connect(&mut self, link: &LinkContext) -> Result<()>;

    /// Performs one unit of transport work.
    async fn cycle_once(&mut self, link: &LinkContext) -> Result<()>;

    /// Releases link resources. Must be safe to call when not connected.
    async fn teardown(&mut self);
}
