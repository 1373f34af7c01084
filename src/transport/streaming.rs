//! Persistent WebSocket driver.
//!
//! The driver keeps one socket open and multiplexes three event sources in
//! each cycle:
//!
//! - inbound text frames, delivered to the connection as they arrive
//! - outbound slot changes, pushed when the content differs from the last
//!   pushed value
//! - the ping timer, which sends a ping carrying a sequence number and
//!   expires pings whose pong never arrived
//!
//! Latency comes from matching each pong's echoed sequence number against
//! the send time of its ping, not from data frames. [`PingMode`] selects how
//! pings travel. WebSocket control frames are the default since compliant
//! peers answer them without application code. Devices that implement their
//! own echo use text frames `{"ping":<id>}` answered by `{"pong":<id>}`;
//! those pong frames are consumed as latency samples and never reach the
//! inbound value.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use serde::{Deserialize, Serialize};
use futures_util::{SinkExt, StreamExt};
use rustc_hash::FxHashMap;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use crate::connection::Payload;
use crate::error::{Error, Result};

use super::{LinkContext, RetryPolicy, TransportDriver};

// ============================================================================
// Constants
// ============================================================================

/// Default bound on opening the socket.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time between pings.
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(1);

/// Default time a ping may stay unanswered.
const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Default delay before reopening a failed socket.
const DEFAULT_REOPEN_DELAY: Duration = Duration::from_secs(1);

/// Bound on the close handshake during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How latency pings are carried on the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PingMode {
    /// WebSocket ping control frames, answered by the peer's protocol stack.
    #[default]
    Control,
    /// Application text frames `{"ping":<id>}` echoed as `{"pong":<id>}`.
    Text,
}

/// Application-level ping frame.
#[derive(Serialize)]
struct PingFrame {
    ping: u64,
}

/// Application-level pong frame.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PongFrame {
    pong: u64,
}

/// Returns the ping id if `text` is an application-level pong frame.
fn text_pong_id(text: &str) -> Option<u64> {
    if !text.trim_start().starts_with('{') {
        return None;
    }
    serde_json::from_str::<PongFrame>(text).ok().map(|frame| frame.pong)
}

// ============================================================================
// StreamingOptions
// ============================================================================

/// Configuration for [`StreamingDriver`].
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingOptions {
    /// Maximum time to open the socket.
    pub connect_timeout: Duration,

    /// Time between latency pings.
    pub ping_interval: Duration,

    /// Time after which an unanswered ping fails the link.
    pub ping_timeout: Duration,

    /// How pings are carried.
    pub ping_mode: PingMode,

    /// Reopen schedule after a failure.
    pub retry: RetryPolicy,
}

impl Default for StreamingOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            ping_mode: PingMode::Control,
            retry: RetryPolicy::fixed(DEFAULT_REOPEN_DELAY),
        }
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Sets the ping interval.
    #[inline]
    #[must_use]
    pub fn with_ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = ping_interval;
        self
    }

    /// Sets the ping timeout.
    #[inline]
    #[must_use]
    pub fn with_ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = ping_timeout;
        self
    }

    /// Sets how pings are carried.
    #[inline]
    #[must_use]
    pub fn with_ping_mode(mut self, ping_mode: PingMode) -> Self {
        self.ping_mode = ping_mode;
        self
    }

    /// Sets the reopen policy.
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Upper bound on pings in flight, derived from the timing options.
    #[inline]
    #[must_use]
    pub fn max_pending_pings(&self) -> usize {
        let ratio = self.ping_timeout.as_nanos() / self.ping_interval.as_nanos().max(1);
        (ratio as usize).saturating_add(2)
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.connect_timeout.is_zero() {
            return Err("Streaming connect timeout must be greater than zero".to_string());
        }
        if self.ping_interval.is_zero() {
            return Err("Streaming ping interval must be greater than zero".to_string());
        }
        if self.ping_timeout < self.ping_interval {
            return Err("Streaming ping timeout must not be shorter than the ping interval".to_string());
        }
        self.retry.validate()
    }
}

// ============================================================================
// Session
// ============================================================================

/// State of one open socket.
struct Session {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    outbound_rx: watch::Receiver<Option<Payload>>,
    last_pushed: Option<Payload>,
    ping_timer: Interval,
    /// Ping sequence number -> send time.
    pending_pings: FxHashMap<u64, Instant>,
    next_ping_id: u64,
}

impl Session {
    /// Pushes the outbound slot if it differs from what was last pushed.
    async fn push_outbound(&mut self) -> Result<()> {
        let current = self.outbound_rx.borrow_and_update().clone();
        let Some(payload) = current else {
            return Ok(());
        };
        if self.last_pushed.as_ref() == Some(&payload) {
            trace!("Outbound value unchanged, not pushing");
            return Ok(());
        }

        self.write.send(Message::text(payload.to_string())).await?;
        self.last_pushed = Some(payload);
        Ok(())
    }

    /// Expires overdue pings, then sends a new one.
    async fn ping(&mut self, options: &StreamingOptions) -> Result<()> {
        let now = Instant::now();
        if let Some((&id, _)) = self
            .pending_pings
            .iter()
            .filter(|(_, sent)| now.duration_since(**sent) >= options.ping_timeout)
            .min_by_key(|(id, _)| **id)
        {
            return Err(Error::ping_timeout(id, options.ping_timeout.as_millis() as u64));
        }

        if self.pending_pings.len() >= options.max_pending_pings() {
            warn!(pending = self.pending_pings.len(), "Too many pings in flight, skipping");
            return Ok(());
        }

        let id = self.next_ping_id;
        self.next_ping_id = self.next_ping_id.wrapping_add(1);
        let frame = match options.ping_mode {
            PingMode::Control => Message::Ping(id.to_be_bytes().to_vec().into()),
            PingMode::Text => Message::text(serde_json::to_string(&PingFrame { ping: id })?),
        };
        self.write.send(frame).await?;
        self.pending_pings.insert(id, now);
        trace!(ping_id = id, mode = ?options.ping_mode, "Ping sent");
        Ok(())
    }

    /// Matches a control-frame pong against its ping.
    fn control_pong(&mut self, data: &[u8]) -> Option<Duration> {
        let id = <[u8; 8]>::try_from(data).ok().map(u64::from_be_bytes)?;
        self.pong(id)
    }

    /// Matches a pong id against its ping and returns the measured latency.
    fn pong(&mut self, id: u64) -> Option<Duration> {
        let sent = self.pending_pings.remove(&id)?;
        // Older pings were answered out of order or lost; the newer echo
        // supersedes them.
        self.pending_pings.retain(|&pending, _| pending > id);
        Some(sent.elapsed())
    }
}

// ============================================================================
// StreamingDriver
// ============================================================================

/// Persistent bidirectional driver over WebSocket.
pub struct StreamingDriver {
    url: Url,
    options: StreamingOptions,
    session: Option<Session>,
}

impl StreamingDriver {
    /// Creates a driver targeting `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL scheme is not `ws`/`wss` or the
    /// options are invalid.
    pub fn new(url: Url, options: StreamingOptions) -> Result<Self> {
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Streaming transport needs a ws(s) URL, got scheme '{}'",
                url.scheme()
            )));
        }
        options.validate().map_err(Error::config)?;

        Ok(Self {
            url,
            options,
            session: None,
        })
    }

    /// Returns the target URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &StreamingOptions {
        &self.options
    }

    /// Returns `true` while a socket is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }
}

#[async_trait]
impl TransportDriver for StreamingDriver {
    fn name(&self) -> &'static str {
        "streaming"
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.options.retry
    }

    async fn attempt_connect(&mut self, link: &LinkContext) -> Result<()> {
        let connect_timeout_ms = self.options.connect_timeout.as_millis() as u64;
        let (ws_stream, _response) = timeout(self.options.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout_ms))??;

        let (write, read) = ws_stream.split();

        let mut outbound_rx = link.subscribe_outbound();
        // Push whatever was set before the socket opened.
        outbound_rx.mark_changed();

        let mut ping_timer = interval(self.options.ping_interval);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.session = Some(Session {
            write,
            read,
            outbound_rx,
            last_pushed: None,
            ping_timer,
            pending_pings: FxHashMap::default(),
            next_ping_id: 0,
        });

        debug!(connection_id = %link.connection_id(), url = %self.url, "WebSocket connection established");
        link.report_link_up();
        Ok(())
    }

    async fn cycle_once(&mut self, link: &LinkContext) -> Result<()> {
        let options = &self.options;
        let session = self.session.as_mut().ok_or(Error::ConnectionClosed)?;

        tokio::select! {
            message = session.read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let pong_id = match options.ping_mode {
                            PingMode::Text => text_pong_id(text.as_str()),
                            PingMode::Control => None,
                        };
                        if let Some(id) = pong_id {
                            match session.pong(id) {
                                Some(latency) => {
                                    trace!(connection_id = %link.connection_id(), ?latency, "Text pong received");
                                    link.report_round_trip(latency);
                                }
                                None => trace!(ping_id = id, "Unknown text pong ignored"),
                            }
                        } else if let Some(ticket) = link.issue_ticket() {
                            link.report_exchange_result(ticket, text.as_str(), None);
                        }
                    }

                    Some(Ok(Message::Pong(data))) => {
                        match session.control_pong(&data) {
                            Some(latency) => {
                                trace!(connection_id = %link.connection_id(), ?latency, "Pong received");
                                link.report_round_trip(latency);
                            }
                            None => trace!("Unsolicited pong ignored"),
                        }
                    }

                    Some(Ok(Message::Close(frame))) => {
                        debug!(connection_id = %link.connection_id(), ?frame, "WebSocket closed by remote");
                        return Err(Error::ConnectionClosed);
                    }

                    Some(Err(e)) => return Err(e.into()),

                    None => {
                        debug!(connection_id = %link.connection_id(), "WebSocket stream ended");
                        return Err(Error::ConnectionClosed);
                    }

                    // Ignore Binary, Ping, raw frames
                    Some(Ok(_)) => {}
                }
            }

            changed = session.outbound_rx.changed() => {
                if changed.is_err() {
                    return Err(Error::ConnectionClosed);
                }
                session.push_outbound().await?;
            }

            _ = session.ping_timer.tick() => {
                session.ping(options).await?;
            }
        }

        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            if timeout(CLOSE_TIMEOUT, session.write.close()).await.is_err() {
                debug!(url = %self.url, "WebSocket close handshake timed out");
            }
            debug!(url = %self.url, "WebSocket session torn down");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
