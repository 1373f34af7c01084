//! HTTP request/response polling driver.
//!
//! Each cycle POSTs the current outbound value to the device and treats the
//! response body as the inbound value. The elapsed time of the request is the
//! round-trip latency. Cycles run back to back unless a minimum cycle
//! interval is configured.
//!
//! # Wire Format
//!
//! ```text
//! POST {url}
//! Content-Type: text/plain; charset=utf-8
//!
//! {outbound payload, or empty body when nothing was set yet}
//!
//! 200 OK
//!
//! {inbound payload, delivered verbatim}
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};

use super::{LinkContext, RetryPolicy, TransportDriver};

// ============================================================================
// Constants
// ============================================================================

/// Default bound on a single request/response exchange.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Default content type of outbound requests.
const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

// ============================================================================
// PollingOptions
// ============================================================================

/// Configuration for [`PollingDriver`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollingOptions {
    /// Maximum time for one exchange, request and body included.
    pub request_timeout: Duration,

    /// Minimum time between the starts of two cycles (zero = back to back).
    pub min_cycle_interval: Duration,

    /// `Content-Type` header sent with each request.
    pub content_type: String,

    /// Backoff between failed cycles.
    pub retry: RetryPolicy,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PollingOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            min_cycle_interval: Duration::ZERO,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            retry: RetryPolicy::exponential(),
        }
    }

    /// Sets the per-exchange timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Sets the minimum cycle interval.
    #[inline]
    #[must_use]
    pub fn with_min_cycle_interval(mut self, interval: Duration) -> Self {
        self.min_cycle_interval = interval;
        self
    }

    /// Sets the request content type.
    #[inline]
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Sets the retry policy.
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.request_timeout.is_zero() {
            return Err("Polling request timeout must be greater than zero".to_string());
        }
        if self.content_type.trim().is_empty() {
            return Err("Polling content type must not be empty".to_string());
        }
        self.retry.validate()
    }
}

// ============================================================================
// PollingDriver
// ============================================================================

/// Request/response driver over HTTP.
pub struct PollingDriver {
    url: Url,
    options: PollingOptions,
    client: Client,
    last_cycle_start: Option<Instant>,
}

impl PollingDriver {
    /// Creates a driver targeting `url`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL scheme is not `http`/`https` or the
    ///   options are invalid
    /// - [`Error::Http`] if the HTTP client cannot be built
    pub fn new(url: Url, options: PollingOptions) -> Result<Self> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "Polling transport needs an http(s) URL, got scheme '{}'",
                url.scheme()
            )));
        }
        options.validate().map_err(Error::config)?;

        let client = Client::builder().build()?;

        Ok(Self {
            url,
            options,
            client,
            last_cycle_start: None,
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
    pub fn options(&self) -> &PollingOptions {
        &self.options
    }

    /// Waits until the minimum cycle interval since the last start elapsed.
    async fn pace(&mut self) {
        if let Some(last) = self.last_cycle_start
            && !self.options.min_cycle_interval.is_zero()
        {
            sleep_until(last + self.options.min_cycle_interval).await;
        }
        self.last_cycle_start = Some(Instant::now());
    }

    /// Sends `body` and returns the response text.
    async fn exchange(&self, body: String) -> Result<String> {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, self.options.content_type.as_str())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http_status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl TransportDriver for PollingDriver {
    fn name(&self) -> &'static str {
        "polling"
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.options.retry
    }

    async fn attempt_connect(&mut self, link: &LinkContext) -> Result<()> {
        // HTTP has no session; the first completed exchange marks the link up.
        debug!(connection_id = %link.connection_id(), url = %self.url, "Polling session begins");
        self.last_cycle_start = None;
        Ok(())
    }

    async fn cycle_once(&mut self, link: &LinkContext) -> Result<()> {
        self.pace().await;

        let Some(exchange) = link.begin_exchange() else {
            return Err(Error::ConnectionClosed);
        };

        let body = exchange
            .outbound
            .map(|payload| payload.to_string())
            .unwrap_or_default();

        let started = Instant::now();
        let response = timeout(self.options.request_timeout, self.exchange(body))
            .await
            .map_err(|_| Error::request_timeout(self.options.request_timeout.as_millis() as u64))??;
        let round_trip = started.elapsed();

        trace!(
            connection_id = %link.connection_id(),
            ticket = %exchange.ticket,
            ?round_trip,
            "Polling exchange completed"
        );

        link.report_exchange_result(exchange.ticket, response, Some(round_trip));
        Ok(())
    }

    async fn teardown(&mut self) {
        self.last_cycle_start = None;
    }
}

// ============================================================================
// Tests
// ============================================================================
