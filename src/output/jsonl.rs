//! JSON Lines row sink

use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::{check_arity, OutputError, OutputResult, RowSink};
use crate::schema::{ColumnSpec, Row};

/// Writes one JSON object per row, keyed by column name
pub struct JsonLinesSink<W: Write> {
    writer: W,
    columns: Vec<ColumnSpec>,
    rows_written: u64,
}

impl JsonLinesSink<BufWriter<File>> {
    /// Create a JSON Lines file, creating parent directories as needed
    pub fn create<P: AsRef<Path>>(path: P, columns: Vec<ColumnSpec>) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Creating JSON Lines writer: path={}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;
        }

        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;
        Ok(Self::new(BufWriter::new(file), columns))
    }
}

impl<W: Write> JsonLinesSink<W> {
    /// Sink over any writer
    pub fn new(writer: W, columns: Vec<ColumnSpec>) -> Self {
        Self {
            writer,
            columns,
            rows_written: 0,
        }
    }

    /// Number of rows written so far
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Finish and return the underlying writer
    pub fn into_inner(mut self) -> OutputResult<W> {
        self.finish()?;
        Ok(self.writer)
    }
}

impl<W: Write> RowSink for JsonLinesSink<W> {
    fn add(&mut self, row: Row) -> OutputResult<()> {
        check_arity(self.columns.len(), &row)?;

        let object: Map<String, Value> = self
            .columns
            .iter()
            .zip(&row)
            .map(|(column, value)| (column.name.clone(), value.to_json(column)))
            .collect();

        serde_json::to_writer(&mut self.writer, &Value::Object(object))
            .map_err(|e| OutputError::SerializationError(format!("Failed to write row: {e}")))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| OutputError::IoError(format!("Failed to write row: {e}")))?;
        self.rows_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        debug!("Closing JSON Lines writer: {} total rows written", self.rows_written);
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))
    }
}
