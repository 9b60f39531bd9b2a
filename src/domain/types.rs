//! Shared domain types.
//!
//! Plain value types, serializable so they can be:
//!
//! - passed by value between pipeline stages
//! - exported to CSV/JSON
//! - reloaded later for plotting

use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A single loosely-typed cell as returned by a store.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    Number(f64),
}

impl RawValue {
    pub fn text(s: impl Into<String>) -> Self {
        RawValue::Text(s.into())
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl std::fmt::Display for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawValue::Null => write!(f, "NULL"),
            RawValue::Text(s) => write!(f, "{s}"),
            RawValue::Number(v) => write!(f, "{v}"),
        }
    }
}

/// One row of a raw result set.
pub type RawRecord = Vec<RawValue>;

/// A result set exactly as the store produced it.
///
/// Column names are kept verbatim; identification of `ds`/`y` happens in the
/// normalizer, not here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<RawRecord>,
}

impl RawResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<RawRecord>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A validated `(timestamp, value)` observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub ds: NaiveDateTime,
    pub y: f64,
}

/// The validated, typed series fed to the forecaster.
///
/// Never empty, every value finite. Order is whatever the store returned;
/// nothing here sorts or deduplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSeries {
    points: Vec<Observation>,
}

impl CanonicalSeries {
    /// Build a series from already-validated observations.
    ///
    /// `rows_read` is only used for the error message when `points` is empty.
    pub fn new(points: Vec<Observation>, rows_read: usize) -> Result<Self, PipelineError> {
        if points.is_empty() {
            return Err(PipelineError::EmptySeries { rows_read });
        }
        if let Some(bad) = points.iter().find(|p| !p.y.is_finite()) {
            return Err(PipelineError::Forecast(format!(
                "Non-finite value {} at {} in canonical series.",
                bad.y, bad.ds
            )));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Observation] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> &Observation {
        &self.points[0]
    }

    pub fn last(&self) -> &Observation {
        &self.points[self.points.len() - 1]
    }

    /// Earliest and latest timestamps (the series is not assumed sorted).
    pub fn time_bounds(&self) -> (NaiveDateTime, NaiveDateTime) {
        let mut lo = self.points[0].ds;
        let mut hi = lo;
        for p in &self.points[1..] {
            lo = lo.min(p.ds);
            hi = hi.max(p.ds);
        }
        (lo, hi)
    }

    pub fn value_bounds(&self) -> (f64, f64) {
        self.points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.y), hi.max(p.y)))
    }
}

/// Sampling frequency of forecast steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Day,
    Month,
}

impl Frequency {
    pub fn unit_label(self) -> &'static str {
        match self {
            Frequency::Day => "days",
            Frequency::Month => "months",
        }
    }
}

/// Bounds and default for the horizon control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HorizonRange {
    pub min: u32,
    pub max: u32,
    pub default: u32,
}

impl HorizonRange {
    /// Daily slider: 30..=365 days, default 90.
    pub const DAILY: HorizonRange = HorizonRange {
        min: 30,
        max: 365,
        default: 90,
    };

    /// Monthly variant: a fixed 32 calendar-month horizon.
    pub const MONTHLY: HorizonRange = HorizonRange {
        min: 32,
        max: 32,
        default: 32,
    };

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }
}

/// Number of future steps to forecast, already checked against a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Horizon(u32);

impl Horizon {
    pub fn new(steps: u32, range: HorizonRange) -> Result<Self, PipelineError> {
        if steps < range.min || steps > range.max {
            return Err(PipelineError::Config(format!(
                "Horizon {steps} is outside the allowed range [{}, {}].",
                range.min, range.max
            )));
        }
        Ok(Self(steps))
    }

    pub fn default_for(range: HorizonRange) -> Self {
        Self(range.default.clamp(range.min, range.max))
    }

    pub fn steps(self) -> u32 {
        self.0
    }

    /// Move the horizon by `delta` steps, saturating at the range bounds.
    pub fn shifted(self, delta: i64, range: HorizonRange) -> Self {
        let next = (self.0 as i64 + delta).clamp(range.min as i64, range.max as i64);
        Self(next as u32)
    }
}

/// Forecast variants: step unit and horizon control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Daily steps with a 30..=365 day horizon control.
    Daily,
    /// Month-end steps with a fixed 32-month horizon.
    Monthly,
}

impl Variant {
    pub fn frequency(self) -> Frequency {
        match self {
            Variant::Daily => Frequency::Day,
            Variant::Monthly => Frequency::Month,
        }
    }

    pub fn horizon_range(self) -> HorizonRange {
        match self {
            Variant::Daily => HorizonRange::DAILY,
            Variant::Monthly => HorizonRange::MONTHLY,
        }
    }
}

/// Which chart renderer presents the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChartBackend {
    /// Plotters chart inside the terminal dashboard.
    Interactive,
    /// Fixed-size text chart printed to stdout.
    Static,
}

/// Where the raw result set comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Snowflake,
    Csv,
    Synthetic,
}

/// One forecast output row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub ds: NaiveDateTime,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// A single seasonal component of the additive model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalitySpec {
    pub name: String,
    /// Period in days.
    pub period_days: f64,
    pub fourier_order: usize,
}

impl SeasonalitySpec {
    pub fn yearly() -> Self {
        Self {
            name: "yearly".to_string(),
            period_days: 365.25,
            fourier_order: 10,
        }
    }

    pub fn weekly() -> Self {
        Self {
            name: "weekly".to_string(),
            period_days: 7.0,
            fourier_order: 3,
        }
    }

    /// Number of design columns (sin + cos per order).
    pub fn width(&self) -> usize {
        2 * self.fourier_order
    }
}

/// Fitted additive model parameters.
///
/// Time is scaled as `t = (ds - t_start) / t_span_days` and values as
/// `y / y_scale`; `betas` are in scaled units and ordered as
/// `[intercept, slope, hinge_1..hinge_c, season_1..season_s]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub t_start: NaiveDateTime,
    pub t_span_days: f64,
    pub y_scale: f64,
    /// Changepoint locations in scaled time.
    pub changepoints: Vec<f64>,
    pub seasonalities: Vec<SeasonalitySpec>,
    pub betas: Vec<f64>,
    /// Changepoint prior scale chosen by model selection.
    pub prior_scale: f64,
    /// Residual standard deviation in original units.
    pub sigma: f64,
}

impl ModelParams {
    pub fn design_len(&self) -> usize {
        2 + self.changepoints.len() + self.seasonalities.iter().map(SeasonalitySpec::width).sum::<usize>()
    }
}

/// Fit quality diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    pub sse: f64,
    pub rmse: f64,
    pub bic: f64,
    pub n: usize,
    /// Effective parameter count used in the BIC.
    pub k: usize,
}

/// Forecaster output: history rows followed by `horizon` future rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub rows: Vec<ForecastRow>,
    /// Index of the first future row (== number of historical rows).
    pub history_len: usize,
    pub frequency: Frequency,
    pub horizon: Horizon,
    pub interval_width: f64,
    pub model: ModelParams,
    pub quality: FitQuality,
}

impl Forecast {
    pub fn history_rows(&self) -> &[ForecastRow] {
        &self.rows[..self.history_len]
    }

    pub fn future_rows(&self) -> &[ForecastRow] {
        &self.rows[self.history_len..]
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: SourceKind,
    pub csv_path: Option<PathBuf>,
    pub secrets_path: Option<PathBuf>,

    pub table: String,
    pub date_col: String,
    pub value_col: String,

    pub variant: Variant,
    pub chart: ChartBackend,
    pub debug: bool,

    /// Probability mass covered by `[yhat_lower, yhat_upper]`.
    pub interval_width: f64,
    /// Seed for the synthetic source.
    pub seed: u64,
    /// Row count for the synthetic source.
    pub synthetic_rows: usize,

    pub plot_width: usize,
    pub plot_height: usize,
    pub table_rows: usize,

    pub export_csv: Option<PathBuf>,
    pub export_json: Option<PathBuf>,
    pub debug_bundle: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Snowflake,
            csv_path: None,
            secrets_path: None,
            table: "forecast_data".to_string(),
            date_col: "ds".to_string(),
            value_col: "y".to_string(),
            variant: Variant::Daily,
            chart: ChartBackend::Interactive,
            debug: false,
            interval_width: 0.80,
            seed: 42,
            synthetic_rows: 730,
            plot_width: 100,
            plot_height: 25,
            table_rows: 20,
            export_csv: None,
            export_json: None,
            debug_bundle: false,
        }
    }
}

impl RunConfig {
    pub fn frequency(&self) -> Frequency {
        self.variant.frequency()
    }

    pub fn horizon_range(&self) -> HorizonRange {
        self.variant.horizon_range()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn horizon_respects_daily_bounds() {
        assert!(Horizon::new(29, HorizonRange::DAILY).is_err());
        assert!(Horizon::new(366, HorizonRange::DAILY).is_err());
        assert_eq!(Horizon::new(30, HorizonRange::DAILY).unwrap().steps(), 30);
        assert_eq!(Horizon::new(365, HorizonRange::DAILY).unwrap().steps(), 365);
        assert_eq!(Horizon::default_for(HorizonRange::DAILY).steps(), 90);
    }

    #[test]
    fn horizon_shift_saturates() {
        let h = Horizon::default_for(HorizonRange::DAILY);
        assert_eq!(h.shifted(-1000, HorizonRange::DAILY).steps(), 30);
        assert_eq!(h.shifted(1000, HorizonRange::DAILY).steps(), 365);
        assert_eq!(h.shifted(5, HorizonRange::DAILY).steps(), 95);
        let m = Horizon::default_for(HorizonRange::MONTHLY);
        assert_eq!(m.shifted(10, HorizonRange::MONTHLY).steps(), 32);
    }

    #[test]
    fn empty_series_is_rejected() {
        let err = CanonicalSeries::new(Vec::new(), 3).unwrap_err();
        assert!(matches!(err, PipelineError::EmptySeries { rows_read: 3 }));
    }

    #[test]
    fn time_bounds_do_not_assume_order() {
        let s = CanonicalSeries::new(
            vec![
                Observation { ds: at(2023, 3, 1), y: 1.0 },
                Observation { ds: at(2023, 1, 1), y: 2.0 },
                Observation { ds: at(2023, 2, 1), y: 3.0 },
            ],
            3,
        )
        .unwrap();
        assert_eq!(s.time_bounds(), (at(2023, 1, 1), at(2023, 3, 1)));
        assert_eq!(s.value_bounds(), (1.0, 3.0));
        assert_eq!(s.first().ds, at(2023, 3, 1));
    }
}
