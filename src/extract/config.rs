//! Extraction configuration constants

use std::time::Duration;

/// Retries after the initial request for 429/5xx responses.
/// One initial request plus 5 retries means at most 6 requests and 5 sleeps.
pub const MAX_RETRIES: u32 = 5;

/// Longest sleep the client will honour before a retry.
/// A rate-limit reset further away than this surfaces the error instead.
pub const MAX_SLEEP_SECS: u64 = 1200;

/// Entities per synchronous stats request
pub const SYNC_BATCH_SIZE: usize = 10;

/// API ceiling on entity ids per stats request
pub const MAX_ENTITY_IDS_PER_REQUEST: usize = 20;

/// Longest window for a synchronous stats request (days)
pub const SYNC_MAX_WINDOW_DAYS: u32 = 7;

/// Entities per async stats job
pub const ASYNC_BATCH_SIZE: usize = 5;

/// Longest window for an async stats job (days)
pub const ASYNC_MAX_WINDOW_DAYS: u32 = 90;

/// Delay between async job status polls
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Status polls before an async job is considered stuck
pub const MAX_POLL_ATTEMPTS: u32 = 60;

/// Retries after the initial attempt for job result downloads
pub const DOWNLOAD_MAX_RETRIES: u32 = 5;

/// Default page size for entity and card listings
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Linear backoff: the n-th retry (1-based) waits n seconds
pub fn linear_backoff(retry: u32) -> Duration {
    Duration::from_secs(u64::from(retry.max(1)))
}
