//! Connection core: state machine, latest-value buffers and dispatch.
//!
//! The core knows nothing about transports. Drivers talk to it through
//! [`LinkContext`](crate::transport::LinkContext), which forwards to the
//! `report_*` methods below tagged with the driver's [`Generation`].
//!
//! # Locking
//!
//! Mutable state sits behind one `parking_lot::Mutex` that is never held
//! while listeners run. Each operation computes its notifications under the
//! lock, releases it, then publishes them while holding a re-entrant
//! dispatch lock. That keeps notifications in report order across threads
//! and still lets a listener call back into the connection (for example
//! `stop()` from a state-change handler).

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, ExchangeTicket, Generation, ListenerId};

use super::listeners::Listeners;
use super::payload::Payload;
use super::state::{ConnectionState, Health};

// ============================================================================
// Types
// ============================================================================

/// Notification computed under the state lock, published after release.
enum Notification {
    State {
        new: ConnectionState,
        old: ConnectionState,
    },
    Data(Payload),
}

/// Mutable state guarded by the core's lock.
#[derive(Default)]
struct CoreState {
    state: ConnectionState,
    /// Last state delivered to observers. Lags `state` only while a batch
    /// of notifications is being dispatched.
    published: ConnectionState,
    enabled: bool,
    closed: bool,
    generation: Generation,
    last_error: Option<Arc<Error>>,
    round_trip: Option<Duration>,
    inbound: Option<Payload>,
    /// Next exchange sequence number to hand out.
    next_seq: u64,
    /// Sequence number of the newest applied exchange result.
    last_applied_seq: Option<u64>,
}

impl CoreState {
    /// Moves to `next`, recording a notification. Same-state is a no-op.
    fn transition(&mut self, next: ConnectionState, out: &mut Vec<Notification>) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );

        let old = self.state;
        self.state = next;
        if next != ConnectionState::Error {
            self.last_error = None;
        }
        out.push(Notification::State { new: next, old });
    }

    /// Walks toward `Connected` along legal edges.
    fn advance_to_connected(&mut self, out: &mut Vec<Notification>) {
        if self.state == ConnectionState::Error {
            self.transition(ConnectionState::Connecting, out);
        }
        if self.state == ConnectionState::Connecting {
            self.transition(ConnectionState::Connected, out);
        }
    }

    /// Drops transitions that were computed but not yet delivered, so the
    /// next transition chains from what observers last saw.
    fn rewind_unpublished(&mut self) {
        self.state = self.published;
    }

    /// Returns `true` if reports tagged with `generation` may be applied.
    fn accepts(&self, generation: Generation) -> bool {
        self.enabled && !self.closed && self.generation == generation
    }
}

// ============================================================================
// ConnectionCore
// ============================================================================

/// Transport-independent heart of a connection.
pub(crate) struct ConnectionCore {
    id: ConnectionId,
    inner: Mutex<CoreState>,
    /// Coalescing outbound slot. `send_replace` never waits.
    outbound: watch::Sender<Option<Payload>>,
    state_tx: watch::Sender<ConnectionState>,
    listeners: Listeners,
    dispatch: ReentrantMutex<()>,
}

// ============================================================================
// ConnectionCore - Constructor
// ============================================================================

impl ConnectionCore {
    /// Creates a disabled, disconnected core.
    pub fn new(id: ConnectionId) -> Self {
        let (outbound, _) = watch::channel(None);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            id,
            inner: Mutex::new(CoreState::default()),
            outbound,
            state_tx,
            listeners: Listeners::default(),
            dispatch: ReentrantMutex::new(()),
        }
    }

    /// Returns the connection ID.
    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

// ============================================================================
// ConnectionCore - Lifecycle
// ============================================================================

impl ConnectionCore {
    /// Enables transport activity and enters `Connecting`.
    ///
    /// Returns the new generation, or `None` if already enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`close`](Self::close).
    pub fn start(&self) -> Result<Option<Generation>> {
        let _dispatch = self.dispatch.lock();
        let mut out = Vec::new();

        let generation = {
            let mut s = self.inner.lock();
            if s.closed {
                return Err(Error::Closed);
            }
            if s.enabled {
                return Ok(None);
            }
            s.enabled = true;
            s.generation = s.generation.next();
            s.transition(ConnectionState::Connecting, &mut out);
            s.generation
        };

        debug!(connection_id = %self.id, %generation, "Connection started");
        self.publish(generation, out);
        Ok(Some(generation))
    }

    /// Disables transport activity and forces `Disconnected`.
    ///
    /// Clears `last_error`, `round_trip` and the inbound value. Returns
    /// `true` if the connection was enabled.
    pub fn stop(&self) -> bool {
        let _dispatch = self.dispatch.lock();
        let mut out = Vec::new();

        let (was_enabled, generation) = {
            let mut s = self.inner.lock();
            let was_enabled = s.enabled;
            if was_enabled {
                s.enabled = false;
                s.generation = s.generation.next();
            }
            s.rewind_unpublished();
            s.transition(ConnectionState::Disconnected, &mut out);
            s.last_error = None;
            s.round_trip = None;
            s.inbound = None;
            (was_enabled, s.generation)
        };

        if was_enabled {
            debug!(connection_id = %self.id, %generation, "Connection stopped");
        }
        self.publish(generation, out);
        was_enabled
    }

    /// Stops the connection and rejects further producer calls.
    pub fn close(&self) {
        self.stop();
        self.inner.lock().closed = true;
        self.listeners.clear();
        debug!(connection_id = %self.id, "Connection closed");
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Returns `true` if `generation` is the live generation of an enabled
    /// connection.
    #[inline]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.inner.lock().accepts(generation)
    }
}

// ============================================================================
// ConnectionCore - Buffers
// ============================================================================

impl ConnectionCore {
    /// Overwrites the outbound slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`close`](Self::close).
    pub fn set_outbound(&self, payload: Payload) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        trace!(connection_id = %self.id, len = payload.len(), "Outbound value replaced");
        self.outbound.send_replace(Some(payload));
        Ok(())
    }

    /// Returns a snapshot of the outbound slot.
    #[inline]
    pub fn outbound(&self) -> Option<Payload> {
        self.outbound.borrow().clone()
    }

    /// Returns a receiver that is woken whenever the outbound slot changes.
    #[inline]
    pub fn subscribe_outbound(&self) -> watch::Receiver<Option<Payload>> {
        self.outbound.subscribe()
    }

    /// Returns the most recently accepted inbound value.
    #[inline]
    pub fn inbound(&self) -> Option<Payload> {
        self.inner.lock().inbound.clone()
    }
}

// ============================================================================
// ConnectionCore - Driver Reports
// ============================================================================

impl ConnectionCore {
    /// Issues a ticket for an exchange about to begin.
    ///
    /// Returns `None` if `generation` is no longer current.
    pub fn begin_exchange(&self, generation: Generation) -> Option<ExchangeTicket> {
        let mut s = self.inner.lock();
        if !s.accepts(generation) {
            return None;
        }
        let seq = s.next_seq;
        s.next_seq += 1;
        Some(ExchangeTicket { generation, seq })
    }

    /// Applies the result of a completed exchange.
    ///
    /// Results from an old generation, or older than the last applied
    /// result, are discarded. Returns `true` if the result was applied.
    pub fn report_exchange_result(
        &self,
        ticket: ExchangeTicket,
        response: Payload,
        round_trip: Option<Duration>,
    ) -> bool {
        let _dispatch = self.dispatch.lock();
        let mut out = Vec::new();

        {
            let mut s = self.inner.lock();
            if !s.accepts(ticket.generation) {
                trace!(connection_id = %self.id, %ticket, "Dropping result from old generation");
                return false;
            }
            if s.last_applied_seq.is_some_and(|last| ticket.seq <= last) {
                debug!(
                    connection_id = %self.id,
                    %ticket,
                    last_applied = ?s.last_applied_seq,
                    "Dropping stale exchange result"
                );
                return false;
            }

            s.last_applied_seq = Some(ticket.seq);
            s.inbound = Some(response.clone());
            if let Some(round_trip) = round_trip {
                s.round_trip = Some(round_trip);
            }
            s.advance_to_connected(&mut out);
        }

        trace!(connection_id = %self.id, %ticket, ?round_trip, "Exchange applied");
        out.push(Notification::Data(response));
        self.publish(ticket.generation, out);
        true
    }

    /// Records a transport failure and enters `Error`.
    ///
    /// A failure while already in `Error` replaces `last_error` without
    /// notifying. Returns `true` if the report was accepted.
    pub fn report_failure(&self, generation: Generation, error: Error) -> bool {
        let _dispatch = self.dispatch.lock();
        let mut out = Vec::new();

        {
            let mut s = self.inner.lock();
            if !s.accepts(generation) {
                trace!(connection_id = %self.id, %generation, error = %error, "Dropping failure from old generation");
                return false;
            }
            if s.state == ConnectionState::Error {
                debug!(connection_id = %self.id, error = %error, "Transport still failing");
            } else {
                warn!(connection_id = %self.id, error = %error, "Transport failure");
            }
            s.last_error = Some(Arc::new(error));
            s.transition(ConnectionState::Error, &mut out);
        }

        self.publish(generation, out);
        true
    }

    /// Records that the link is up without a data exchange.
    pub fn report_link_up(&self, generation: Generation) -> bool {
        self.apply(generation, |s, out| s.advance_to_connected(out))
    }

    /// Records an automatic retry attempt (`Error -> Connecting`).
    pub fn report_retry(&self, generation: Generation) -> bool {
        self.apply(generation, |s, out| {
            if s.state == ConnectionState::Error {
                s.transition(ConnectionState::Connecting, out);
            }
        })
    }

    /// Records a latency sample from a ping echo.
    pub fn report_round_trip(&self, generation: Generation, latency: Duration) -> bool {
        self.apply(generation, |s, out| {
            s.round_trip = Some(latency);
            s.advance_to_connected(out);
        })
    }

    /// Runs `f` under the state lock for an accepted generation, then
    /// publishes what it recorded.
    fn apply(
        &self,
        generation: Generation,
        f: impl FnOnce(&mut CoreState, &mut Vec<Notification>),
    ) -> bool {
        let _dispatch = self.dispatch.lock();
        let mut out = Vec::new();

        {
            let mut s = self.inner.lock();
            if !s.accepts(generation) {
                return false;
            }
            f(&mut s, &mut out);
        }

        self.publish(generation, out);
        true
    }

    /// Publishes notifications in order.
    ///
    /// Stops early if a listener moved the connection to another generation,
    /// so observers never see a transition that has already been overridden.
    fn publish(&self, generation: Generation, notifications: Vec<Notification>) {
        for notification in notifications {
            {
                let mut s = self.inner.lock();
                if s.generation != generation {
                    trace!(connection_id = %self.id, "Generation changed during dispatch");
                    return;
                }
                if let Notification::State { new, .. } = &notification {
                    s.published = *new;
                }
            }
            match notification {
                Notification::State { new, old } => {
                    debug!(connection_id = %self.id, from = %old, to = %new, "State transition");
                    self.state_tx.send_replace(new);
                    self.listeners.emit_state(new, old);
                }
                Notification::Data(payload) => {
                    self.listeners.emit_data(&payload);
                }
            }
        }
    }
}

// ============================================================================
// ConnectionCore - Observers
// ============================================================================

impl ConnectionCore {
    /// Registers a state-change listener.
    pub fn on_state_change(
        &self,
        listener: impl Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.state.add(Arc::new(listener))
    }

    /// Registers a response-data listener.
    pub fn on_response_data(&self, listener: impl Fn(&str) + Send + Sync + 'static) -> ListenerId {
        self.listeners.data.add(Arc::new(listener))
    }

    /// Removes a listener of either kind.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Returns a receiver tracking the current state.
    #[inline]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Returns the current state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Returns the cause of the current `Error` state.
    #[inline]
    pub fn last_error(&self) -> Option<Arc<Error>> {
        self.inner.lock().last_error.clone()
    }

    /// Returns the latest round-trip latency.
    #[inline]
    pub fn round_trip(&self) -> Option<Duration> {
        self.inner.lock().round_trip
    }

    /// Returns whether transport activity is enabled.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    /// Returns the live generation.
    #[inline]
    pub fn generation(&self) -> Generation {
        self.inner.lock().generation
    }

    /// Returns a consistent health snapshot.
    pub fn health(&self) -> Health {
        let s = self.inner.lock();
        Health {
            state: s.state,
            enabled: s.enabled,
            last_error: s.last_error.clone(),
            round_trip: s.round_trip,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
