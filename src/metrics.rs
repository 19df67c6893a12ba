//! Observability metrics for Ads API extraction
//!
//! Counters and histograms for requests, 429s, retries, async job polling and
//! emitted rows. Recording is always cheap: without an installed recorder the
//! `metrics` macros are no-ops, and the Prometheus exporter is only installed
//! when the CLI is given `--metrics-addr`.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent; later calls after a successful install are ignored.
///
/// # Errors
/// Returns an error if the exporter cannot bind or install
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INITIALIZED.load(Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the Ads API"
    );
    describe_counter!(
        "http_429_errors_total",
        Unit::Count,
        "Total number of 429 rate limit errors received"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_counter!(
        "async_job_polls_total",
        Unit::Count,
        "Total number of async stats job status polls"
    );
    describe_counter!(
        "extract_rows_emitted_total",
        Unit::Count,
        "Total number of rows handed to the sink"
    );
    describe_counter!(
        "extracts_completed_total",
        Unit::Count,
        "Total number of successful extractions"
    );
    describe_counter!(
        "extracts_failed_total",
        Unit::Count,
        "Total number of failed extractions"
    );

    METRICS_INITIALIZED.store(true, Ordering::SeqCst);
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Strip host, version and ids so endpoint labels stay low-cardinality
///
/// `https://ads-api.twitter.com/12/stats/accounts/abc` becomes `stats/accounts`.
pub fn endpoint_label(url: &str) -> String {
    let path = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);

    let mut label = Vec::new();
    let mut skip_next = false;
    for (i, segment) in path.split('/').skip(1).filter(|s| !s.is_empty()).enumerate() {
        if i == 0 && segment.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if skip_next {
            skip_next = false;
            continue;
        }
        skip_next = segment == "accounts";
        label.push(segment);
    }
    label.join("/")
}

/// Record an HTTP request with timing
pub struct HttpRequestMetrics {
    endpoint: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP request
    pub fn start(url: &str, attempt: u32) -> Self {
        let endpoint = endpoint_label(url);
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            endpoint = %endpoint,
            attempt = attempt,
            "Starting HTTP request metrics"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record completion of the HTTP request
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => status_code.to_string(),
            "attempt" => self.attempt.to_string(),
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            counter!(
                "http_429_errors_total",
                "endpoint" => self.endpoint.clone(),
            )
            .increment(1);

            warn!(
                correlation_id = %self.correlation_id,
                endpoint = %self.endpoint,
                attempt = self.attempt,
                duration_ms = duration.as_millis(),
                "Rate limit error (429) recorded"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    /// Record a network error (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => "network_error",
            "attempt" => self.attempt.to_string(),
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        warn!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Get the correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "http_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!(
        "retry_backoff_duration_seconds",
        "attempt" => attempt.to_string(),
    )
    .record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis(),
        "Retry backoff recorded"
    );
}

/// Record one async job status poll
pub fn record_job_poll(status: &str) {
    counter!(
        "async_job_polls_total",
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Extraction run metrics
pub struct ExtractMetrics {
    entity: String,
    mode: String,
    start_time: Instant,
}

impl ExtractMetrics {
    /// Start tracking an extraction
    pub fn start(entity: impl Into<String>, mode: impl Into<String>) -> Self {
        let entity = entity.into();
        let mode = mode.into();

        info!(entity = %entity, mode = %mode, "Extraction started");

        Self {
            entity,
            mode,
            start_time: Instant::now(),
        }
    }

    /// Record rows handed to the sink
    pub fn record_rows(&self, rows: u64) {
        counter!(
            "extract_rows_emitted_total",
            "entity" => self.entity.clone(),
        )
        .increment(rows);
    }

    /// Record successful completion
    pub fn record_success(&self, rows: u64) {
        let duration = self.start_time.elapsed();

        counter!(
            "extracts_completed_total",
            "entity" => self.entity.clone(),
            "mode" => self.mode.clone(),
        )
        .increment(1);

        info!(
            entity = %self.entity,
            mode = %self.mode,
            rows = rows,
            duration_secs = duration.as_secs(),
            "Extraction completed successfully"
        );
    }

    /// Record a failed extraction
    pub fn record_failure(&self, error: &str) {
        let duration = self.start_time.elapsed();

        counter!(
            "extracts_failed_total",
            "entity" => self.entity.clone(),
            "mode" => self.mode.clone(),
        )
        .increment(1);

        error!(
            entity = %self.entity,
            mode = %self.mode,
            error = %error,
            duration_secs = duration.as_secs(),
            "Extraction failed"
        );
    }
}

/// Check if metrics system is initialized
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}
