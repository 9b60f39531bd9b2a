//! Shared pipeline logic used by both CLI and TUI front-ends.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! fetch -> normalize -> forecast -> presentation data
//!
//! The CLI and the TUI can then focus on presentation (printing vs widgets).
//! Every interaction re-runs the whole sequence; the TUI may skip the fetch by
//! passing a memoized raw result set to [`run_with_records`].

use std::fmt;

use tracing::{debug, info, warn};

use crate::data::{Query, StoreConnector, connector_for, fetch};
use crate::domain::{Horizon, RawResultSet, RunConfig};
use crate::error::PipelineError;
use crate::forecast::{AdditiveForecaster, Forecaster};
use crate::io::ingest::{ColumnNames, normalize};
use crate::report::PresentationData;

/// Rows of the raw result set echoed to the log in debug mode.
const DEBUG_PREVIEW_ROWS: usize = 5;

/// Pipeline stages. Transitions are strictly linear; any failure is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Fetching,
    Normalizing,
    Forecasting,
    Presenting,
    Done,
    Failed(String),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => write!(f, "idle"),
            Stage::Fetching => write!(f, "fetching"),
            Stage::Normalizing => write!(f, "normalizing"),
            Stage::Forecasting => write!(f, "forecasting"),
            Stage::Presenting => write!(f, "presenting"),
            Stage::Done => write!(f, "done"),
            Stage::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// One pipeline invocation.
///
/// Owns the stage machine; the collaborators are borrowed so tests can swap
/// them out.
pub struct PipelineRun<'a> {
    config: &'a RunConfig,
    forecaster: &'a dyn Forecaster,
    stage: Stage,
}

impl<'a> PipelineRun<'a> {
    pub fn new(config: &'a RunConfig, forecaster: &'a dyn Forecaster) -> Self {
        Self {
            config,
            forecaster,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Fetch, then continue as [`PipelineRun::run_records`].
    pub fn run_connector(
        &mut self,
        connector: &dyn StoreConnector,
        horizon: Horizon,
    ) -> Result<PresentationData, PipelineError> {
        let raw = self.fetch(connector)?;
        self.run_records(connector.describe(), &raw, horizon)
    }

    /// The `Fetching` stage on its own (the TUI memoizes its output).
    pub fn fetch(&mut self, connector: &dyn StoreConnector) -> Result<RawResultSet, PipelineError> {
        self.advance(Stage::Fetching);
        let query = Query::from_config(self.config).map_err(|e| self.fail(e))?;
        let raw = fetch(connector, &query).map_err(|e| self.fail(e))?;
        info!(rows = raw.len(), store = %connector.describe(), "fetched result set");
        Ok(raw)
    }

    /// Normalize, forecast and assemble presentation data from a raw result set.
    pub fn run_records(
        &mut self,
        source: String,
        raw: &RawResultSet,
        horizon: Horizon,
    ) -> Result<PresentationData, PipelineError> {
        let range = self.config.horizon_range();
        let horizon = Horizon::new(horizon.steps(), range).map_err(|e| self.fail(e))?;

        self.advance(Stage::Normalizing);
        if self.config.debug {
            log_preview(raw);
        }
        let columns = ColumnNames {
            ds: self.config.date_col.clone(),
            y: self.config.value_col.clone(),
        };
        let normalized = normalize(raw, &columns).map_err(|e| self.fail(e))?;
        if normalized.report.rows_dropped() > 0 {
            warn!(
                dropped = normalized.report.rows_dropped(),
                read = normalized.report.rows_read,
                "dropped rows during normalization"
            );
        }

        self.advance(Stage::Forecasting);
        let forecast = self
            .forecaster
            .forecast(&normalized.series, horizon, self.config.frequency())
            .map_err(|e| self.fail(e))?;

        self.advance(Stage::Presenting);
        let data = PresentationData {
            source,
            history: normalized.series,
            normalize_report: normalized.report,
            forecast,
        };

        self.advance(Stage::Done);
        Ok(data)
    }

    fn advance(&mut self, next: Stage) {
        debug!(from = %self.stage, to = %next, "pipeline stage");
        self.stage = next;
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        debug!(stage = %err.stage(), error = %err, "pipeline failed");
        self.stage = Stage::Failed(err.to_string());
        err
    }
}

/// Execute the full pipeline for `config` with the built-in forecaster.
pub fn run(config: &RunConfig, horizon: Horizon) -> Result<PresentationData, PipelineError> {
    let connector = connector_for(config)?;
    let forecaster = AdditiveForecaster::new(config.interval_width)?;
    run_with_connector(config, connector.as_ref(), &forecaster, horizon)
}

/// Execute the full pipeline against an explicit store and forecaster.
pub fn run_with_connector(
    config: &RunConfig,
    connector: &dyn StoreConnector,
    forecaster: &dyn Forecaster,
    horizon: Horizon,
) -> Result<PresentationData, PipelineError> {
    PipelineRun::new(config, forecaster).run_connector(connector, horizon)
}

/// Execute the pipeline from an already-fetched result set.
///
/// Used by the TUI so changing the horizon refits without re-querying.
pub fn run_with_records(
    config: &RunConfig,
    source: String,
    raw: &RawResultSet,
    horizon: Horizon,
) -> Result<PresentationData, PipelineError> {
    let forecaster = AdditiveForecaster::new(config.interval_width)?;
    PipelineRun::new(config, &forecaster).run_records(source, raw, horizon)
}

fn log_preview(raw: &RawResultSet) {
    debug!(columns = ?raw.columns, rows = raw.len(), "raw result set");
    for (idx, row) in raw.rows.iter().take(DEBUG_PREVIEW_ROWS).enumerate() {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        debug!(row = idx, cells = ?cells, "raw row");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::data::testing::MemoryStore;
    use crate::domain::{CanonicalSeries, Forecast, Frequency, HorizonRange, RawValue, Variant};

    /// Counts invocations and delegates to the real model.
    struct CountingForecaster {
        calls: Cell<usize>,
    }

    impl Forecaster for CountingForecaster {
        fn forecast(
            &self,
            series: &CanonicalSeries,
            horizon: Horizon,
            frequency: Frequency,
        ) -> Result<Forecast, PipelineError> {
            self.calls.set(self.calls.get() + 1);
            AdditiveForecaster::default().forecast(series, horizon, frequency)
        }
    }

    fn counting() -> CountingForecaster {
        CountingForecaster { calls: Cell::new(0) }
    }

    fn daily_rows(n: i64) -> Vec<Vec<RawValue>> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                let day = start + Duration::days(i);
                vec![
                    RawValue::text(day.format("%Y-%m-%d").to_string()),
                    RawValue::Number(20.0 + 0.2 * i as f64 + ((i * 5) % 9) as f64 * 0.1),
                ]
            })
            .collect()
    }

    fn daily_horizon(steps: u32) -> Horizon {
        Horizon::new(steps, HorizonRange::DAILY).unwrap()
    }

    #[test]
    fn empty_result_halts_before_forecasting() {
        let store = MemoryStore::with_rows(&["ds", "y"], Vec::new());
        let forecaster = counting();
        let config = RunConfig::default();

        let mut run = PipelineRun::new(&config, &forecaster);
        let err = run.run_connector(&store, daily_horizon(90)).unwrap_err();

        assert!(matches!(err, PipelineError::EmptySeries { rows_read: 0 }));
        assert_eq!(err.stage(), Stage::Normalizing);
        assert!(matches!(run.stage(), Stage::Failed(_)));
        assert_eq!(forecaster.calls.get(), 0);
        assert_eq!(store.closed.get(), 1);
    }

    #[test]
    fn hundred_rows_with_horizon_ninety_give_190_rows() {
        let store = MemoryStore::with_rows(&["ds", "y"], daily_rows(100));
        let forecaster = counting();
        let config = RunConfig::default();

        let mut run = PipelineRun::new(&config, &forecaster);
        let data = run.run_connector(&store, daily_horizon(90)).unwrap();

        assert_eq!(data.forecast.rows.len(), 190);
        assert_eq!(data.history.len(), 100);
        assert_eq!(run.stage(), &Stage::Done);
        assert_eq!(forecaster.calls.get(), 1);
        assert_eq!(store.opened.get(), 1);
        assert_eq!(store.closed.get(), 1);
    }

    #[test]
    fn invalid_rows_are_dropped_not_fatal() {
        let mut rows = daily_rows(30);
        rows[3][1] = RawValue::text("bad");
        rows[7][0] = RawValue::text("not-a-date");
        let store = MemoryStore::with_rows(&["DS ", " y"], rows);
        let config = RunConfig::default();

        let data = run_with_connector(&config, &store, &AdditiveForecaster::default(), daily_horizon(30)).unwrap();
        assert_eq!(data.normalize_report.rows_dropped(), 2);
        assert_eq!(data.history.len(), 28);
        assert_eq!(data.forecast.rows.len(), 28 + 30);
    }

    #[test]
    fn query_failure_is_a_fetch_stage_error() {
        let store = MemoryStore::with_result(Err(PipelineError::Query("relation missing".to_string())));
        let forecaster = counting();
        let config = RunConfig::default();

        let err = run_with_connector(&config, &store, &forecaster, daily_horizon(30)).unwrap_err();
        assert_eq!(err.stage(), Stage::Fetching);
        assert_eq!(forecaster.calls.get(), 0);
        assert_eq!(store.closed.get(), 1);
    }

    #[test]
    fn schema_mismatch_lists_found_columns() {
        let store = MemoryStore::with_rows(&["date", "value"], daily_rows(5));
        let err = run_with_connector(
            &RunConfig::default(),
            &store,
            &AdditiveForecaster::default(),
            daily_horizon(30),
        )
        .unwrap_err();

        match err {
            PipelineError::Schema { found, .. } => assert_eq!(found, vec!["date", "value"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn horizon_outside_variant_range_is_config_error() {
        let config = RunConfig {
            variant: Variant::Monthly,
            ..RunConfig::default()
        };
        let raw = RawResultSet::new(vec!["ds".to_string(), "y".to_string()], daily_rows(40));
        let err = run_with_records(&config, "memory".to_string(), &raw, daily_horizon(90)).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn monthly_variant_forecasts_32_month_ends() {
        let config = RunConfig {
            variant: Variant::Monthly,
            ..RunConfig::default()
        };
        let raw = RawResultSet::new(vec!["ds".to_string(), "y".to_string()], daily_rows(60));
        let horizon = Horizon::default_for(HorizonRange::MONTHLY);
        let data = run_with_records(&config, "memory".to_string(), &raw, horizon).unwrap();

        assert_eq!(data.forecast.future_rows().len(), 32);
        assert_eq!(data.forecast.frequency, Frequency::Month);
    }
}
