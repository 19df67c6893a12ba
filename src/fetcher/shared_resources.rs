//! Shared HTTP clients for all fetcher instances
//!
//! One client for Ads API calls and one for async job result downloads. The
//! download client carries a longer request timeout since result files can be
//! large and are served from a separate storage host.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// HTTP connect timeout (seconds)
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Overall request timeout for Ads API calls (seconds)
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Overall request timeout for job result downloads (seconds)
const DOWNLOAD_REQUEST_TIMEOUT_SECS: u64 = 120;

fn build_client(request_timeout_secs: u64) -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(request_timeout_secs))
        .build()
        .unwrap_or_else(|e| {
            panic!("FATAL: Failed to build HTTP client: {}. Check system TLS configuration.", e);
        })
}

/// Global client for Ads API requests
pub static GLOBAL_HTTP_CLIENT: Lazy<Arc<Client>> =
    Lazy::new(|| Arc::new(build_client(HTTP_REQUEST_TIMEOUT_SECS)));

/// Global client for async job result downloads
pub static GLOBAL_DOWNLOAD_CLIENT: Lazy<Arc<Client>> =
    Lazy::new(|| Arc::new(build_client(DOWNLOAD_REQUEST_TIMEOUT_SECS)));

/// Get the global Ads API client
pub fn global_http_client() -> Arc<Client> {
    GLOBAL_HTTP_CLIENT.clone()
}

/// Get the global download client
pub fn global_download_client() -> Arc<Client> {
    GLOBAL_DOWNLOAD_CLIENT.clone()
}
