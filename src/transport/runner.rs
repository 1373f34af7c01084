//! Supervision loop that drives a [`TransportDriver`].
//!
//! One runner task is spawned per `start()`. It owns the driver for its
//! lifetime (through an async mutex, so a restarted connection waits for the
//! previous runner's teardown), connects, cycles, and on failure reports,
//! backs off according to the driver's [`RetryPolicy`](super::RetryPolicy)
//! and reconnects.
//!
//! # Loop
//!
//! ```text
//!  attempt_connect ──ok──► cycle_once ──ok──┐
//!        ▲                     ▲   └────────┘
//!        │                     │ err
//!   report_retry        teardown + report_failure
//!        │                     │
//!        └──── sleep(backoff) ◄┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::Error;

use super::{LinkContext, TransportDriver};

// ============================================================================
// Types
// ============================================================================

/// Driver shared between successive runner tasks.
pub(crate) type SharedDriver = Arc<AsyncMutex<Box<dyn TransportDriver>>>;

// ============================================================================
// Runner
// ============================================================================

/// Drives `driver` until `shutdown` fires or the retry budget runs out.
pub(crate) async fn run(
    driver: SharedDriver,
    link: LinkContext,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut driver = tokio::select! {
        biased;
        _ = stopped(&mut shutdown) => return,
        guard = driver.lock() => guard,
    };

    if !link.is_current() {
        return;
    }

    let name = driver.name();
    let policy = driver.retry_policy();
    let mut attempt: u32 = 0;

    info!(connection_id = %link.connection_id(), generation = %link.generation(), transport = name, "Transport runner started");

    loop {
        let error = tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => break,
            error = drive_session(&mut **driver, &link, &mut attempt) => error,
        };

        driver.teardown().await;

        if !link.is_current() {
            break;
        }

        link.report_failure(error);
        attempt = attempt.saturating_add(1);

        let Some(delay) = policy.delay_for(attempt) else {
            warn!(connection_id = %link.connection_id(), attempt, transport = name, "Retry attempts exhausted");
            return;
        };

        debug!(connection_id = %link.connection_id(), attempt, ?delay, "Retrying after backoff");

        tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => return,
            () = sleep(delay) => {}
        }

        link.report_retry();
    }

    driver.teardown().await;
    debug!(connection_id = %link.connection_id(), generation = %link.generation(), "Transport runner terminated");
}

/// Connects and cycles until the first error.
async fn drive_session(
    driver: &mut dyn TransportDriver,
    link: &LinkContext,
    attempt: &mut u32,
) -> Error {
    if let Err(e) = driver.attempt_connect(link).await {
        return e;
    }

    loop {
        if let Err(e) = driver.cycle_once(link).await {
            return e;
        }
        *attempt = 0;
    }
}

/// Resolves once shutdown is requested or the connection handle is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
