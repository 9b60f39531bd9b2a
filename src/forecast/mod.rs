//! Forecasting stage.
//!
//! The pipeline only depends on the [`Forecaster`] contract: a canonical
//! series plus a horizon and frequency in, one row per historical timestamp
//! followed by `horizon` future rows out. [`AdditiveForecaster`] is the
//! built-in implementation:
//!
//! - piecewise-linear trend with changepoints over the first 80% of history
//! - yearly Fourier seasonality when the history covers two years
//! - weekly Fourier seasonality for daily forecasts over two weeks of history
//! - changepoint prior scale chosen by BIC over a log-spaced grid
//! - intervals `yhat ± z * sigma * sqrt(1 + k / n)` for the k-th future step
//!   (k = 0 in-sample)

pub mod timeline;

use chrono::NaiveDateTime;

use crate::domain::{
    CanonicalSeries, FitQuality, Forecast, ForecastRow, Frequency, Horizon, ModelParams,
    SeasonalitySpec,
};
use crate::error::PipelineError;
use crate::fit::{
    CHANGEPOINT_RANGE, FitProblem, MAX_CHANGEPOINTS, changepoint_grid, default_prior_scales,
    fit_and_select,
};
use crate::math::normal_quantile;
use crate::models::{epoch_days, predict, scaled_time};

pub use timeline::*;

/// Produces point and interval predictions for a canonical series.
///
/// Implementations must be deterministic for identical inputs.
pub trait Forecaster {
    fn forecast(
        &self,
        series: &CanonicalSeries,
        horizon: Horizon,
        frequency: Frequency,
    ) -> Result<Forecast, PipelineError>;
}

/// Minimum history span (days) before a seasonality is modelled: two periods.
const SEASONALITY_MIN_PERIODS: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct AdditiveForecaster {
    interval_width: f64,
    prior_scales: Vec<f64>,
}

impl AdditiveForecaster {
    /// `interval_width` is the probability mass inside `[yhat_lower, yhat_upper]`.
    pub fn new(interval_width: f64) -> Result<Self, PipelineError> {
        if !(interval_width.is_finite() && interval_width > 0.0 && interval_width < 1.0) {
            return Err(PipelineError::Config(format!(
                "Interval width must be in (0, 1), got {interval_width}."
            )));
        }
        Ok(Self {
            interval_width,
            prior_scales: default_prior_scales(),
        })
    }

    pub fn interval_width(&self) -> f64 {
        self.interval_width
    }

    fn z(&self) -> Result<f64, PipelineError> {
        normal_quantile(0.5 + self.interval_width / 2.0).ok_or_else(|| {
            PipelineError::Forecast(format!("No normal quantile for interval width {}.", self.interval_width))
        })
    }
}

impl Default for AdditiveForecaster {
    fn default() -> Self {
        Self {
            interval_width: 0.80,
            prior_scales: default_prior_scales(),
        }
    }
}

impl Forecaster for AdditiveForecaster {
    fn forecast(
        &self,
        series: &CanonicalSeries,
        horizon: Horizon,
        frequency: Frequency,
    ) -> Result<Forecast, PipelineError> {
        let points = series.points();
        if points.len() < 2 {
            return Err(PipelineError::Forecast(format!(
                "At least 2 observations are required, got {}.",
                points.len()
            )));
        }

        let (t_start, t_end) = series.time_bounds();
        let t_span_days = epoch_days(t_end) - epoch_days(t_start);
        if t_span_days <= 0.0 {
            return Err(PipelineError::Forecast(
                "All observations share one timestamp; no trend can be fitted.".to_string(),
            ));
        }

        let y_scale = points.iter().fold(0.0f64, |m, p| m.max(p.y.abs()));
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };

        let t: Vec<f64> = points.iter().map(|p| scaled_time(t_start, t_span_days, p.ds)).collect();
        let mut t_sorted = t.clone();
        t_sorted.sort_by(f64::total_cmp);

        let seasonalities = seasonalities_for(frequency, t_span_days);
        let problem = FitProblem {
            days: points.iter().map(|p| epoch_days(p.ds)).collect(),
            y: points.iter().map(|p| p.y / y_scale).collect(),
            changepoints: changepoint_grid(&t_sorted, MAX_CHANGEPOINTS, CHANGEPOINT_RANGE),
            seasonalities,
            t,
        };
        tracing::debug!(
            n = problem.n(),
            changepoints = problem.changepoints.len(),
            seasonalities = ?problem.seasonalities.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "fitting additive model"
        );

        let selection = fit_and_select(&problem, &self.prior_scales)?;
        let best = selection.best;

        let n = problem.n();
        let dof = n.saturating_sub(best.fit.k).max(1);
        let sigma = (best.fit.sse / dof as f64).sqrt() * y_scale;
        let sse = best.fit.sse * y_scale * y_scale;

        let model = ModelParams {
            t_start,
            t_span_days,
            y_scale,
            changepoints: problem.changepoints,
            seasonalities: problem.seasonalities,
            betas: best.fit.betas,
            prior_scale: best.fit.prior_scale,
            sigma,
        };

        let z = self.z()?;
        let future = future_timestamps(t_end, frequency, horizon)?;
        let mut rows = Vec::with_capacity(points.len() + future.len());
        for p in points {
            rows.push(row_at(&model, p.ds, z * sigma)?);
        }
        for (k, ds) in future.into_iter().enumerate() {
            let widen = (1.0 + (k + 1) as f64 / n as f64).sqrt();
            rows.push(row_at(&model, ds, z * sigma * widen)?);
        }

        Ok(Forecast {
            rows,
            history_len: points.len(),
            frequency,
            horizon,
            interval_width: self.interval_width,
            model,
            quality: FitQuality {
                sse,
                rmse: (sse / n as f64).sqrt(),
                bic: best.bic,
                n,
                k: best.fit.k,
            },
        })
    }
}

fn seasonalities_for(frequency: Frequency, t_span_days: f64) -> Vec<SeasonalitySpec> {
    let mut out = Vec::new();

    let yearly = SeasonalitySpec::yearly();
    if t_span_days >= SEASONALITY_MIN_PERIODS * yearly.period_days {
        out.push(yearly);
    }

    // Month-end steps would alias any weekly cycle.
    let weekly = SeasonalitySpec::weekly();
    if frequency == Frequency::Day && t_span_days >= SEASONALITY_MIN_PERIODS * weekly.period_days {
        out.push(weekly);
    }

    out
}

fn row_at(model: &ModelParams, ds: NaiveDateTime, half_width: f64) -> Result<ForecastRow, PipelineError> {
    let yhat = predict(model, ds);
    if !(yhat.is_finite() && half_width.is_finite()) {
        return Err(PipelineError::Forecast(format!("Non-finite prediction at {ds}.")));
    }
    Ok(ForecastRow {
        ds,
        yhat,
        yhat_lower: yhat - half_width,
        yhat_upper: yhat + half_width,
    })
}
