//! CSV row sink

use csv::Writer;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::{check_arity, OutputError, OutputResult, RowSink};
use crate::schema::{ColumnSpec, Row};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Writes rows as CSV with a header of column names
///
/// Nulls are empty cells and JSON values are compact JSON text.
pub struct CsvRowSink<W: Write> {
    writer: Writer<W>,
    columns: Vec<ColumnSpec>,
    rows_written: u64,
    header_written: bool,
}

impl CsvRowSink<BufWriter<File>> {
    /// Create a CSV file, creating parent directories as needed
    pub fn create<P: AsRef<Path>>(path: P, columns: Vec<ColumnSpec>) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Creating CSV writer: path={}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;
        }

        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;

        Ok(Self::new(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file), columns))
    }
}

impl<W: Write> CsvRowSink<W> {
    /// Sink over any writer
    pub fn new(writer: W, columns: Vec<ColumnSpec>) -> Self {
        Self {
            writer: Writer::from_writer(writer),
            columns,
            rows_written: 0,
            header_written: false,
        }
    }

    /// Number of data rows written so far
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Finish and return the underlying writer
    pub fn into_inner(mut self) -> OutputResult<W> {
        self.finish()?;
        self.writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get inner writer: {e}")))
    }

    fn write_header(&mut self) -> OutputResult<()> {
        if self.header_written {
            return Ok(());
        }
        self.writer
            .write_record(self.columns.iter().map(|c| c.name.as_str()))
            .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;
        self.header_written = true;
        Ok(())
    }
}

impl<W: Write> RowSink for CsvRowSink<W> {
    fn add(&mut self, row: Row) -> OutputResult<()> {
        check_arity(self.columns.len(), &row)?;
        self.write_header()?;

        let fields: Vec<String> = row
            .iter()
            .zip(&self.columns)
            .map(|(value, column)| value.to_field(column))
            .collect();
        self.writer
            .write_record(&fields)
            .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;

        self.rows_written += 1;

        // Flush periodically (every 1000 rows)
        if self.rows_written % 1000 == 0 {
            self.writer
                .flush()
                .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))?;
            debug!("Progress: {} rows written", self.rows_written);
        }
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        // An empty run still gets a header
        self.write_header()?;
        debug!("Closing CSV writer: {} total rows written", self.rows_written);
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))
    }
}
