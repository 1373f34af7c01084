//! Driver-facing handle to a connection core.
//!
//! A [`LinkContext`] is bound to one generation. Every report made through
//! it is silently dropped once the connection has been stopped or restarted,
//! so a driver never needs its own cancellation bookkeeping.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::connection::ConnectionCore;
use crate::connection::Payload;
use crate::error::Error;
use crate::identifiers::{ConnectionId, ExchangeTicket, Generation};

// ============================================================================
// Exchange
// ============================================================================

/// An exchange that is about to be performed.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Provenance tag to hand back with the result.
    pub ticket: ExchangeTicket,
    /// Outbound value snapshot taken when the exchange began.
    pub outbound: Option<Payload>,
}

// ============================================================================
// LinkContext
// ============================================================================

/// Reporting and buffer access for a transport driver.
#[derive(Clone)]
pub struct LinkContext {
    core: Arc<ConnectionCore>,
    generation: Generation,
}

impl LinkContext {
    /// Binds a context to `generation` of `core`.
    pub(crate) fn new(core: Arc<ConnectionCore>, generation: Generation) -> Self {
        Self { core, generation }
    }

    /// Returns the connection ID, for log correlation.
    #[inline]
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.core.id()
    }

    /// Returns the generation this context is bound to.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns `true` while the bound generation is live.
    #[inline]
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.core.is_current(self.generation)
    }

    /// Returns a snapshot of the outbound slot.
    #[inline]
    #[must_use]
    pub fn outbound(&self) -> Option<Payload> {
        self.core.outbound()
    }

    /// Returns a receiver woken on each outbound write.
    #[inline]
    #[must_use]
    pub fn subscribe_outbound(&self) -> watch::Receiver<Option<Payload>> {
        self.core.subscribe_outbound()
    }

    /// Issues a ticket without snapshotting the outbound slot.
    ///
    /// Used for inbound messages that are not replies to a request.
    #[inline]
    #[must_use]
    pub fn issue_ticket(&self) -> Option<ExchangeTicket> {
        self.core.begin_exchange(self.generation)
    }

    /// Begins an exchange: issues a ticket and snapshots the outbound slot.
    ///
    /// Returns `None` once the generation is stale.
    #[must_use]
    pub fn begin_exchange(&self) -> Option<Exchange> {
        let ticket = self.core.begin_exchange(self.generation)?;
        Some(Exchange {
            ticket,
            outbound: self.core.outbound(),
        })
    }

    /// Reports a completed exchange. Returns `true` if it was applied.
    pub fn report_exchange_result(
        &self,
        ticket: ExchangeTicket,
        response: impl Into<Payload>,
        round_trip: Option<Duration>,
    ) -> bool {
        self.core
            .report_exchange_result(ticket, response.into(), round_trip)
    }

    /// Reports a transport failure.
    pub fn report_failure(&self, error: Error) -> bool {
        self.core.report_failure(self.generation, error)
    }

    /// Reports that the link is up.
    pub fn report_link_up(&self) -> bool {
        self.core.report_link_up(self.generation)
    }

    /// Reports an automatic retry attempt.
    pub fn report_retry(&self) -> bool {
        self.core.report_retry(self.generation)
    }

    /// Reports a latency sample from an echo exchange.
    pub fn report_round_trip(&self, latency: Duration) -> bool {
        self.core.report_round_trip(self.generation, latency)
    }
}
