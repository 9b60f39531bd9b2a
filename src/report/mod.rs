//! Reporting utilities: presentation data and formatted terminal output.

use crate::domain::{CanonicalSeries, Forecast};
use crate::io::ingest::NormalizeReport;

pub mod format;

pub use format::*;

/// Everything a presenter needs from one successful run.
#[derive(Debug, Clone)]
pub struct PresentationData {
    /// Human-readable store description (e.g. `csv:data.csv`).
    pub source: String,
    pub history: CanonicalSeries,
    pub normalize_report: NormalizeReport,
    pub forecast: Forecast,
}

impl PresentationData {
    /// Residuals `y - yhat` over the history, in series order.
    pub fn residuals(&self) -> Vec<f64> {
        self.history
            .points()
            .iter()
            .zip(self.forecast.history_rows())
            .map(|(p, r)| p.y - r.yhat)
            .collect()
    }
}
