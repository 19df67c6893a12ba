//! CLI error types and conversions

use crate::extract::ExtractError;
use crate::fetcher::FetcherError;
use crate::output::OutputError;
use crate::schema::SchemaError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Column schema error
    #[error("schema error: {0}")]
    SchemaError(#[from] SchemaError),

    /// Extraction error
    #[error("extract error: {0}")]
    ExtractError(#[from] ExtractError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
