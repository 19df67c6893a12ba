//! Async job result download
//!
//! Results are gzip-compressed JSON files served from a storage host, not
//! from the Ads API. They are fetched with the plain download client (no
//! request signing, no rate-limit classification) and retried with linear
//! backoff on any failure.

use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::Client;
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::extract::config::{linear_backoff, DOWNLOAD_MAX_RETRIES};
use crate::fetcher::clock::Clock;
use crate::fetcher::shared_resources::global_download_client;
use crate::fetcher::{FetcherError, FetcherResult};

/// Decompress a gzip payload
pub fn gunzip(compressed: &[u8]) -> FetcherResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| FetcherError::Download(format!("malformed gzip payload: {e}")))?;
    Ok(decompressed)
}

/// Decompress and decode a result payload into its `data` array
pub fn decode_result(compressed: &[u8]) -> FetcherResult<Vec<Value>> {
    let decompressed = gunzip(compressed)?;
    let body: Value = serde_json::from_slice(&decompressed)
        .map_err(|e| FetcherError::Download(format!("malformed result JSON: {e}")))?;

    match body.get("data") {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Err(FetcherError::Download(
            "result payload has no data array".to_string(),
        )),
    }
}

/// Downloads and decodes async job results
pub struct JobResultDownloader {
    client: Arc<Client>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl JobResultDownloader {
    /// Downloader over the shared download client
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_client(global_download_client(), clock)
    }

    /// Downloader over an explicit client
    pub fn with_client(client: Arc<Client>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            clock,
            max_retries: DOWNLOAD_MAX_RETRIES,
        }
    }

    async fn fetch_bytes(&self, url: &str) -> FetcherResult<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetcherError::Download(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(FetcherError::Download(format!(
                "result download failed: HTTP {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| FetcherError::Download(format!("failed to read body: {e}")))
    }

    /// Download `url` and return the decoded `data` array
    ///
    /// # Errors
    /// Returns the last `Download` error once retries are exhausted.
    pub async fn download(&self, url: &str) -> FetcherResult<Vec<Value>> {
        let mut retries = 0u32;

        loop {
            debug!("Downloading job result from {} (attempt {})", url, retries + 1);

            let result = match self.fetch_bytes(url).await {
                Ok(bytes) => decode_result(&bytes).map(|items| (bytes.len(), items)),
                Err(e) => Err(e),
            };

            match result {
                Ok((size, items)) => {
                    info!(
                        bytes = size,
                        records = items.len(),
                        "Downloaded async job result"
                    );
                    return Ok(items);
                }
                Err(e) if retries < self.max_retries => {
                    retries += 1;
                    let backoff = linear_backoff(retries);
                    warn!(
                        "Job result download failed (attempt {}/{}): {} - waiting {:?}",
                        retries, self.max_retries, e, backoff
                    );
                    self.clock.sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
