//! In-memory sink

use super::{OutputResult, RowSink};
use crate::schema::Row;

/// Collects rows in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    rows: Vec<Row>,
    finished: bool,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows received so far
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Take ownership of the collected rows
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Whether `finish` has been called
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl RowSink for MemorySink {
    fn add(&mut self, row: Row) -> OutputResult<()> {
        self.rows.push(row);
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        self.finished = true;
        Ok(())
    }
}
