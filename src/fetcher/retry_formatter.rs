//! Retry message formatting for the Ads API client.
//!
//! Keeps the wording of retry, recovery and final-failure log lines in one
//! place so every endpoint reports retries the same way.

use std::time::Duration;

use super::{ClientErrorKind, FetcherError, ServerErrorKind};

/// Classification of retry errors for user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Connection refused, DNS failure, TLS or read timeout
    Network,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// HTTP 400 invalid request
    InvalidRequest,
    /// Authentication or permission failures (401/403)
    AuthFailed(u16),
    /// HTTP 404
    NotFound,
    /// Anything the client does not classify by status
    Other,
}

impl RetryErrorType {
    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "network error",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::InvalidRequest => "invalid request",
            Self::AuthFailed(code) => match code {
                401 => "not authorized (401)",
                403 => "forbidden (403)",
                _ => "authorization failed",
            },
            Self::NotFound => "resource not found",
            Self::Other => "unexpected error",
        }
    }

    /// Suggested remediation presented with actionable guidance after failures.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Network => "Check network connectivity and DNS resolution",
            Self::RateLimit => "Wait for the rate-limit window to reset or reduce the date range",
            Self::ServerError(_) => "The Ads API may be degraded, try again later",
            Self::InvalidRequest => "Check entity, metric groups, placement and date range arguments",
            Self::AuthFailed(_) => "Verify the access token and that it has access to the ads account",
            Self::NotFound => "Verify the account id and API version",
            Self::Other => "Re-run with RUST_LOG=debug for request details",
        }
    }

    /// Determine whether the error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError(_))
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current retry number (1-based)
    pub attempt: u32,
    /// Maximum number of retries configured
    pub max_attempts: u32,
    /// Type of error that triggered retry
    pub error_type: RetryErrorType,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Original error message for details
    pub error_message: String,
    /// URL that failed
    pub endpoint: String,
}

impl RetryContext {
    /// Convenience constructor used throughout the retry logic.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        error: &FetcherError,
        backoff_duration: Duration,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type: extract_error_type(error),
            backoff_duration,
            error_message: error.to_string(),
            endpoint: endpoint.into(),
        }
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({})",
            self.attempt,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64(),
            self.endpoint
        )
    }

    /// Format retry success message when a previous attempt eventually works.
    pub fn format_success(&self) -> String {
        format!(
            "Retry attempt {}/{} succeeded ({})",
            self.attempt, self.max_attempts, self.endpoint
        )
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = vec![
            format!("[FAILED] Request failed after {} retries", self.attempt),
            format!("  Last error: {}", self.error_message),
            format!("  Endpoint: {}", self.endpoint),
            "  Suggestions:".to_string(),
        ];

        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }

        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        let mut suggestions = vec![self.error_type.suggestion().to_string()];
        if self.error_type.is_retryable() {
            suggestions.push(format!(
                "Try increasing --max-retries (current: {})",
                self.max_attempts
            ));
        }
        suggestions
    }
}

/// Extract a [`RetryErrorType`] from a fetcher error.
pub fn extract_error_type(error: &FetcherError) -> RetryErrorType {
    match error {
        FetcherError::Client { kind, .. } => match kind {
            ClientErrorKind::BadRequest => RetryErrorType::InvalidRequest,
            ClientErrorKind::NotAuthorized | ClientErrorKind::Forbidden => {
                RetryErrorType::AuthFailed(kind.status())
            }
            ClientErrorKind::NotFound => RetryErrorType::NotFound,
            ClientErrorKind::RateLimit => RetryErrorType::RateLimit,
        },
        FetcherError::Server { kind, .. } => match kind {
            ServerErrorKind::ServiceUnavailable => RetryErrorType::ServerError(503),
            ServerErrorKind::Generic(code) => RetryErrorType::ServerError(*code),
        },
        FetcherError::Network(_) => RetryErrorType::Network,
        _ => RetryErrorType::Other,
    }
}
