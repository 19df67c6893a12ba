//! Ads API fetchers
//!
//! Everything that talks to the network lives here: the transport seam, the
//! retrying client, cursor pagination, the two stats strategies and the card
//! listing.

use crate::extract::window::TimeWindow;
use crate::{Entity, StatsRecord};
use async_trait::async_trait;
use std::fmt;

pub mod ads_config;
pub mod ads_http;
pub mod ads_parser;
pub mod async_job;
pub mod cards;
pub mod clock;
pub mod job_result;
pub mod pagination;
pub mod retry_formatter;
pub mod shared_resources;
pub mod stats;
pub mod transport;

pub use ads_config::AdsApiConfig;
pub use ads_http::AdsHttpClient;
pub use async_job::AsyncJobOrchestrator;
pub use cards::CardFetcher;
pub use clock::{Clock, ManualClock, SystemClock};
pub use pagination::EntityPager;
pub use stats::{StatsQuery, SyncStatsFetcher};
pub use transport::{
    AdsTransport, ApiResponse, BearerAuthorizer, HttpMethod, NoAuthorizer, RequestAuthorizer,
    ReqwestTransport,
};

/// Non-retryable and rate-limit client errors (4xx)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    /// 400
    BadRequest,
    /// 401
    NotAuthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 429
    RateLimit,
}

impl ClientErrorKind {
    /// HTTP status this kind is raised for
    pub fn status(&self) -> u16 {
        match self {
            ClientErrorKind::BadRequest => 400,
            ClientErrorKind::NotAuthorized => 401,
            ClientErrorKind::Forbidden => 403,
            ClientErrorKind::NotFound => 404,
            ClientErrorKind::RateLimit => 429,
        }
    }
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientErrorKind::BadRequest => "bad request",
            ClientErrorKind::NotAuthorized => "not authorized",
            ClientErrorKind::Forbidden => "forbidden",
            ClientErrorKind::NotFound => "not found",
            ClientErrorKind::RateLimit => "rate limit",
        };
        write!(f, "{s}")
    }
}

/// Server errors (5xx)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    /// 503
    ServiceUnavailable,
    /// Any other 5xx
    Generic(u16),
}

impl ServerErrorKind {
    /// HTTP status this kind is raised for
    pub fn status(&self) -> u16 {
        match self {
            ServerErrorKind::ServiceUnavailable => 503,
            ServerErrorKind::Generic(code) => *code,
        }
    }
}

impl fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerErrorKind::ServiceUnavailable => write!(f, "service unavailable"),
            ServerErrorKind::Generic(code) => write!(f, "HTTP {code}"),
        }
    }
}

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Classified 4xx response
    #[error("client error ({kind}): {body}")]
    Client {
        /// Which client error
        kind: ClientErrorKind,
        /// Response body
        body: String,
    },

    /// Classified 5xx response
    #[error("server error ({kind}): {body}")]
    Server {
        /// Which server error
        kind: ServerErrorKind,
        /// Response body
        body: String,
    },

    /// Unexpected response shape or status
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An async job did not finish within the poll ceiling
    #[error("timeout: {0}")]
    Timeout(String),

    /// Caller supplied an unusable argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The API reported an async job as failed
    #[error("async job {job_id} failed")]
    JobFailed {
        /// Job id as reported by the API
        job_id: String,
    },

    /// Transport-level failure (connect, timeout, TLS)
    #[error("network error: {0}")]
    Network(String),

    /// Async job result could not be downloaded or decoded
    #[error("download error: {0}")]
    Download(String),
}

impl FetcherError {
    /// Whether the retrying client recovers from this error locally
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetcherError::Client {
                kind: ClientErrorKind::RateLimit,
                ..
            } | FetcherError::Server { .. }
                | FetcherError::Network(_)
        )
    }

    /// HTTP status behind a classified error
    pub fn status(&self) -> Option<u16> {
        match self {
            FetcherError::Client { kind, .. } => Some(kind.status()),
            FetcherError::Server { kind, .. } => Some(kind.status()),
            _ => None,
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Strategy that turns entities and time windows into stats records
///
/// Sync and async extraction implement the same contract; the pipeline drives
/// one `fetch_chunk` call per (entity batch, time window) pair.
#[async_trait]
pub trait StatsFetcher: Send + Sync {
    /// Entities per request
    fn batch_size(&self) -> usize;

    /// Longest window a single request may cover, in days
    fn max_window_days(&self) -> u32;

    /// Fetch one record per entity in `batch` for `window`
    async fn fetch_chunk(
        &self,
        query: &StatsQuery,
        batch: &[Entity],
        window: &TimeWindow,
    ) -> FetcherResult<Vec<StatsRecord>>;

    /// Fetch every (batch, window) pair into one list
    async fn fetch(
        &self,
        query: &StatsQuery,
        entities: &[Entity],
        windows: &[TimeWindow],
    ) -> FetcherResult<Vec<StatsRecord>> {
        let mut records = Vec::new();
        for_each_chunk(self, query, entities, windows, |chunk| {
            records.extend(chunk);
            Ok::<_, FetcherError>(())
        })
        .await?;
        Ok(records)
    }
}

/// Drive `fetcher` over every (batch, window) pair, batches outermost,
/// handing each chunk's records to `on_chunk` as soon as it arrives
///
/// Stops at the first fetch or handler error. Returns the number of chunks
/// handled.
pub async fn for_each_chunk<S, F, E>(
    fetcher: &S,
    query: &StatsQuery,
    entities: &[Entity],
    windows: &[TimeWindow],
    mut on_chunk: F,
) -> Result<usize, E>
where
    S: StatsFetcher + ?Sized,
    F: FnMut(Vec<StatsRecord>) -> Result<(), E>,
    E: From<FetcherError>,
{
    let mut chunks = 0;
    for batch in entities.chunks(fetcher.batch_size().max(1)) {
        for window in windows {
            let records = fetcher.fetch_chunk(query, batch, window).await?;
            on_chunk(records)?;
            chunks += 1;
        }
    }
    Ok(chunks)
}
