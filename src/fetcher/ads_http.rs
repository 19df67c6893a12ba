//! Retrying Ads API HTTP client
//!
//! Wraps an [`AdsTransport`] with:
//! - Classification of 400/401/403/404/429/5xx into [`FetcherError`]
//! - Retries for 429, 5xx and transport failures
//! - Sleep derived from `x-account-rate-limit-reset` / `x-rate-limit-reset`,
//!   falling back to linear backoff
//! - A ceiling on how long a single sleep may be

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::extract::config::{linear_backoff, MAX_RETRIES, MAX_SLEEP_SECS};
use crate::fetcher::clock::{Clock, SystemClock};
use crate::fetcher::retry_formatter::RetryContext;
use crate::fetcher::transport::{AdsTransport, ApiResponse, HttpMethod};
use crate::fetcher::{ClientErrorKind, FetcherError, FetcherResult, ServerErrorKind};
use crate::metrics::{record_retry_backoff, HttpRequestMetrics};

/// Rate-limit reset headers in lookup order; first present value wins
pub const RATE_LIMIT_RESET_HEADERS: [&str; 2] = ["x-account-rate-limit-reset", "x-rate-limit-reset"];

/// Classify a status code into the error taxonomy
///
/// Returns `None` for statuses outside the recognized set (2xx, 3xx and the
/// unlisted 4xx codes); those responses are handed back to the caller as-is.
pub fn classify(status: u16, body: &str) -> Option<FetcherError> {
    let kind = match status {
        400 => ClientErrorKind::BadRequest,
        401 => ClientErrorKind::NotAuthorized,
        403 => ClientErrorKind::Forbidden,
        404 => ClientErrorKind::NotFound,
        429 => ClientErrorKind::RateLimit,
        503 => {
            return Some(FetcherError::Server {
                kind: ServerErrorKind::ServiceUnavailable,
                body: body.to_string(),
            })
        }
        500..=599 => {
            return Some(FetcherError::Server {
                kind: ServerErrorKind::Generic(status),
                body: body.to_string(),
            })
        }
        _ => return None,
    };
    Some(FetcherError::Client {
        kind,
        body: body.to_string(),
    })
}

/// Epoch-second reset hint from the response headers
///
/// An unparsable value is treated as absent.
pub fn rate_limit_reset(response: &ApiResponse) -> Option<i64> {
    let raw = RATE_LIMIT_RESET_HEADERS
        .iter()
        .find_map(|name| response.header(name))?;
    match raw.trim().parse::<i64>() {
        Ok(reset) => Some(reset),
        Err(e) => {
            warn!("Ignoring unparsable rate-limit reset header '{}': {}", raw, e);
            None
        }
    }
}

/// Seconds to sleep before the `retry`-th retry (1-based)
pub fn retry_sleep_secs(reset: Option<i64>, now: i64, retry: u32) -> u64 {
    match reset {
        Some(reset) => reset.saturating_sub(now).max(0) as u64,
        None => linear_backoff(retry).as_secs(),
    }
}

/// Ads API client with error classification and rate-limit aware retries
pub struct AdsHttpClient {
    transport: Arc<dyn AdsTransport>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
    max_sleep_secs: u64,
}

impl AdsHttpClient {
    /// Client over a transport, using the system clock and default ceilings
    pub fn new(transport: Arc<dyn AdsTransport>) -> Self {
        Self::with_clock(transport, Arc::new(SystemClock))
    }

    /// Client over a transport with an explicit clock
    pub fn with_clock(transport: Arc<dyn AdsTransport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            clock,
            max_retries: MAX_RETRIES,
            max_sleep_secs: MAX_SLEEP_SECS,
        }
    }

    /// Override the retry ceiling
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the longest acceptable sleep
    pub fn with_max_sleep_secs(mut self, max_sleep_secs: u64) -> Self {
        self.max_sleep_secs = max_sleep_secs;
        self
    }

    /// Configured retry ceiling
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Clock used for sleeps; shared with the async job poller
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Perform a request, retrying 429/5xx/transport failures
    ///
    /// # Errors
    /// Returns the classified error for 400/401/403/404 immediately; for
    /// retryable errors returns the last one once retries are exhausted or the
    /// required sleep exceeds the ceiling.
    pub async fn execute(
        &self,
        method: HttpMethod,
        url: &str,
        params: &[(String, String)],
    ) -> FetcherResult<ApiResponse> {
        let mut retries = 0u32;
        let mut last_retry: Option<RetryContext> = None;

        loop {
            let request_metrics = HttpRequestMetrics::start(url, retries + 1);
            debug!(method = %method, url = %url, attempt = retries + 1, "Ads API request");

            let (err, reset) = match self.transport.send(method, url, params).await {
                Ok(response) => {
                    request_metrics.record_complete(response.status);
                    match classify(response.status, &response.text()) {
                        None => {
                            if let Some(ctx) = &last_retry {
                                info!("{}", ctx.format_success());
                            }
                            return Ok(response);
                        }
                        Some(err) => {
                            error!(
                                status = response.status,
                                url = %url,
                                body = %response.text(),
                                "Ads API returned an error response"
                            );
                            let reset = rate_limit_reset(&response);
                            (err, reset)
                        }
                    }
                }
                Err(err) => {
                    request_metrics.record_network_error();
                    (err, None)
                }
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if retries >= self.max_retries {
                let ctx = RetryContext::new(retries, self.max_retries, &err, Duration::ZERO, url);
                error!("{}", ctx.format_failure());
                return Err(err);
            }

            retries += 1;
            let sleep_secs = retry_sleep_secs(reset, self.clock.now_epoch_secs(), retries);
            if sleep_secs > self.max_sleep_secs {
                warn!(
                    sleep_secs = sleep_secs,
                    max_sleep_secs = self.max_sleep_secs,
                    url = %url,
                    "Rate-limit reset is too far away, giving up"
                );
                return Err(err);
            }

            let backoff = Duration::from_secs(sleep_secs);
            let ctx = RetryContext::new(retries, self.max_retries, &err, backoff, url);
            warn!("{}", ctx.format_retry());
            record_retry_backoff(backoff, retries);
            last_retry = Some(ctx);
            self.clock.sleep(backoff).await;
        }
    }

    /// GET and decode a JSON body
    ///
    /// # Errors
    /// Besides [`execute`](Self::execute) errors, returns `Protocol` for an
    /// unclassified non-2xx status or a body that is not JSON.
    pub async fn get_json(&self, url: &str, params: &[(String, String)]) -> FetcherResult<Value> {
        let response = self.execute(HttpMethod::Get, url, params).await?;
        decode_json(url, &response)
    }

    /// POST and decode a JSON body
    ///
    /// # Errors
    /// Same as [`get_json`](Self::get_json).
    pub async fn post_json(&self, url: &str, params: &[(String, String)]) -> FetcherResult<Value> {
        let response = self.execute(HttpMethod::Post, url, params).await?;
        decode_json(url, &response)
    }
}

fn decode_json(url: &str, response: &ApiResponse) -> FetcherResult<Value> {
    if !response.is_success() {
        let body = response.text();
        error!(status = response.status, url = %url, body = %body, "Unexpected Ads API status");
        return Err(FetcherError::Protocol(format!(
            "unexpected status {} from {url}: {body}",
            response.status
        )));
    }

    serde_json::from_slice(&response.body).map_err(|e| {
        let body = response.text();
        error!(url = %url, body = %body, "Ads API returned malformed JSON");
        FetcherError::Protocol(format!("malformed JSON from {url}: {e}"))
    })
}
