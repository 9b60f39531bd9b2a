//! CSV file standing in for the warehouse table.
//!
//! The file is treated as a table dump: the header row gives the column names
//! and file order stands in for the query's `ORDER BY`. Every column is
//! returned so that column identification (and its schema errors) stays in the
//! normalizer. Cells are passed through as text; nothing is parsed here.

use std::fs::File;
use std::path::PathBuf;

use tracing::debug;

use crate::data::{Query, StoreConnection, StoreConnector};
use crate::domain::{RawRecord, RawResultSet, RawValue};
use crate::error::PipelineError;

pub struct CsvTableConnector {
    path: PathBuf,
}

impl CsvTableConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StoreConnector for CsvTableConnector {
    fn describe(&self) -> String {
        format!("csv {}", self.path.display())
    }

    fn connect(&self) -> Result<Box<dyn StoreConnection>, PipelineError> {
        let file = File::open(&self.path).map_err(|e| {
            PipelineError::Connection(format!("Failed to open CSV '{}': {e}", self.path.display()))
        })?;
        Ok(Box::new(CsvTableConnection { file: Some(file) }))
    }
}

struct CsvTableConnection {
    file: Option<File>,
}

impl StoreConnection for CsvTableConnection {
    fn execute(&mut self, query: &Query) -> Result<RawResultSet, PipelineError> {
        let file = self
            .file
            .take()
            .ok_or_else(|| PipelineError::Connection("CSV table already consumed.".to_string()))?;

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(file);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| PipelineError::Query(format!("Failed to read CSV headers: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            // +2: 1-based lines, plus the header line.
            let record = record
                .map_err(|e| PipelineError::Query(format!("CSV parse error on line {}: {e}", idx + 2)))?;
            let row: RawRecord = record
                .iter()
                .map(|cell| {
                    if cell.trim().is_empty() {
                        RawValue::Null
                    } else {
                        RawValue::text(cell)
                    }
                })
                .collect();
            rows.push(row);
        }

        debug!(table = %query.table, rows = rows.len(), "read csv table");
        Ok(RawResultSet::new(columns, rows))
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        self.file = None;
        Ok(())
    }
}
