//! Shared test utilities.
//!
//! [`ScriptedDriver`] is a fault-injecting transport: each cycle records the
//! outbound snapshot it would have sent, then waits for the test to script
//! the device's reply.

#![allow(dead_code)]

use std::future::pending;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use teleop_link::{ConnectionState, Error, LinkContext, Result, RetryPolicy, TransportDriver};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Reply
// ============================================================================

/// Scripted outcome of one cycle.
#[derive(Debug)]
pub enum Reply {
    /// Device answered with `text` after `round_trip`.
    Data(&'static str, Duration),
    /// Cycle fails with a connection error.
    Fail(&'static str),
}

// ============================================================================
// DriverLog
// ============================================================================

/// Test-side view of a [`ScriptedDriver`].
#[derive(Clone, Default)]
pub struct DriverLog {
    /// Outbound snapshot of every cycle, in order.
    pub sent: Arc<Mutex<Vec<Option<String>>>>,
    /// Time of every connect attempt.
    pub connects: Arc<Mutex<Vec<Instant>>>,
    /// Number of teardowns.
    pub teardowns: Arc<AtomicUsize>,
}

impl DriverLog {
    pub fn sent(&self) -> Vec<Option<String>> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    pub fn teardown_count(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

// ============================================================================
// ScriptedDriver
// ============================================================================

pub struct ScriptedDriver {
    log: DriverLog,
    connect_failures: usize,
    retry: RetryPolicy,
    replies: mpsc::UnboundedReceiver<Reply>,
}

impl ScriptedDriver {
    /// Creates a driver whose first `connect_failures` connects fail.
    pub fn new(connect_failures: usize, retry: RetryPolicy) -> (Self, DriverLog, mpsc::UnboundedSender<Reply>) {
        let (tx, replies) = mpsc::unbounded_channel();
        let log = DriverLog::default();
        (
            Self {
                log: log.clone(),
                connect_failures,
                retry,
                replies,
            },
            log,
            tx,
        )
    }
}

#[async_trait]
impl TransportDriver for ScriptedDriver {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn attempt_connect(&mut self, _link: &LinkContext) -> Result<()> {
        self.log.connects.lock().push(Instant::now());
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(Error::connection("simulated connect failure"));
        }
        Ok(())
    }

    async fn cycle_once(&mut self, link: &LinkContext) -> Result<()> {
        let exchange = link.begin_exchange().ok_or(Error::ConnectionClosed)?;
        self.log
            .sent
            .lock()
            .push(exchange.outbound.map(|p| p.to_string()));

        match self.replies.recv().await {
            Some(Reply::Data(text, round_trip)) => {
                link.report_exchange_result(exchange.ticket, text, Some(round_trip));
                Ok(())
            }
            Some(Reply::Fail(message)) => Err(Error::connection(message)),
            None => pending().await,
        }
    }

    async fn teardown(&mut self) {
        self.log.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fast fixed retry used by most tests.
pub fn quick_retry() -> RetryPolicy {
    RetryPolicy::fixed(Duration::from_millis(10))
}

/// Waits until `condition` holds, panicking after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

/// Records every `(new, old)` transition.
pub fn record_transitions(
    conn: &teleop_link::Connection,
) -> Arc<Mutex<Vec<(ConnectionState, ConnectionState)>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    conn.on_state_change(move |new, old| sink.lock().push((new, old)));
    log
}
