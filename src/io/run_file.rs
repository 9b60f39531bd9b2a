//! Read/write forecast run JSON files.
//!
//! A run file is the "portable" representation of one pipeline run:
//! - the canonical history that was fitted
//! - model parameters (trend, changepoints, seasonalities)
//! - every forecast row, so plotting needs no refit
//!
//! `forecast plot --run <file>` renders it without touching the warehouse.

use std::fs::File;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{Forecast, Observation};
use crate::error::PipelineError;
use crate::report::PresentationData;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFile {
    pub tool: String,
    pub generated_at: NaiveDateTime,
    pub source: String,
    pub history: Vec<Observation>,
    pub forecast: Forecast,
}

impl RunFile {
    pub fn from_presentation(data: &PresentationData) -> Self {
        Self {
            tool: "forecast".to_string(),
            generated_at: chrono::Utc::now().naive_utc(),
            source: data.source.clone(),
            history: data.history.points().to_vec(),
            forecast: data.forecast.clone(),
        }
    }
}

/// Write a run JSON file.
pub fn write_run_json(path: &Path, data: &PresentationData) -> Result<(), PipelineError> {
    let file = File::create(path).map_err(|e| {
        PipelineError::Export(format!("Failed to create run JSON '{}': {e}", path.display()))
    })?;

    serde_json::to_writer_pretty(file, &RunFile::from_presentation(data))
        .map_err(|e| PipelineError::Export(format!("Failed to write run JSON: {e}")))?;

    Ok(())
}

/// Read a run JSON file.
pub fn read_run_json(path: &Path) -> Result<RunFile, PipelineError> {
    let file = File::open(path).map_err(|e| {
        PipelineError::Export(format!("Failed to open run JSON '{}': {e}", path.display()))
    })?;
    let run: RunFile = serde_json::from_reader(file)
        .map_err(|e| PipelineError::Export(format!("Invalid run JSON: {e}")))?;

    if run.forecast.history_len > run.forecast.rows.len() {
        return Err(PipelineError::Export(
            "Invalid run JSON: history_len exceeds the number of forecast rows.".to_string(),
        ));
    }
    Ok(run)
}
