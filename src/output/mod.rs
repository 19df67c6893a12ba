//! Row assembly and row sinks

use crate::schema::Row;

pub mod assembler;
pub mod csv;
pub mod jsonl;
pub mod memory;
pub mod value;

pub use assembler::{EntityIndex, RowAssembler};
pub use self::csv::CsvRowSink;
pub use jsonl::JsonLinesSink;
pub use memory::MemorySink;

/// Output sink errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),

    /// Row does not match the column schema
    #[error("row has {actual} values but the schema has {expected} columns")]
    ArityMismatch {
        /// Columns in the schema
        expected: usize,
        /// Values in the row
        actual: usize,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for assembled rows
///
/// Rows arrive one at a time in emission order; `finish` is called once after
/// the last row of a successful run.
pub trait RowSink {
    /// Accept one row
    fn add(&mut self, row: Row) -> OutputResult<()>;

    /// Flush and finalize output
    fn finish(&mut self) -> OutputResult<()>;

    /// Accept several rows in order
    fn add_all(&mut self, rows: impl IntoIterator<Item = Row>) -> OutputResult<u64>
    where
        Self: Sized,
    {
        let mut count = 0;
        for row in rows {
            self.add(row)?;
            count += 1;
        }
        Ok(count)
    }
}

pub(crate) fn check_arity(expected: usize, row: &Row) -> OutputResult<()> {
    if row.len() != expected {
        return Err(OutputError::ArityMismatch {
            expected,
            actual: row.len(),
        });
    }
    Ok(())
}
