//! Extraction pipeline
//!
//! Ties the fetchers and the row assembler together for one run.
//!
//! # Overview
//!
//! 1. **Job**: describe what to extract with [`job::ExtractJob`]
//! 2. **Entities**: the full entity set is listed once via
//!    [`crate::fetcher::EntityPager`]
//! 3. **Chunking**: [`window::split`] cuts the date range into windows the
//!    chosen strategy accepts (7 days sync, 90 days async)
//! 4. **Stats**: one [`crate::fetcher::StatsFetcher::fetch_chunk`] call per
//!    (entity batch, time window)
//! 5. **Rows**: [`crate::output::RowAssembler`] expands each record into one
//!    row per day, handed to a [`crate::output::RowSink`] as soon as the chunk
//!    is fetched
//!
//! # Error Handling
//!
//! There is no partial-success mode. The first unrecovered error aborts the
//! run; rows already handed to the sink stay there.

pub mod config;
pub mod executor;
pub mod job;
pub mod window;

pub use executor::{ExtractExecutor, ExtractSummary};
pub use job::{ExtractJob, FetchMode};
pub use window::TimeWindow;

use crate::fetcher::FetcherError;
use crate::output::OutputError;

/// Extraction errors
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Ads API failure
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetcherError),

    /// Sink failure
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Unusable date, timezone or range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Job failed validation
    #[error("validation error: {0}")]
    Validation(String),
}

/// Result type for extraction
pub type ExtractResult<T> = Result<T, ExtractError>;
