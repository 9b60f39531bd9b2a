//! Additive model evaluation.
//!
//! The fitter relies on two primitive operations:
//! - build a design row for a given time (for least squares)
//! - predict y(ds) given fitted parameters (for residuals/forecasts)
//!
//! Column layout matches `ModelParams::betas`:
//! `[1, t, hinge(t, c_1).., fourier(season_1).., fourier(season_2)..]`.

use chrono::NaiveDateTime;

use crate::domain::{ModelParams, SeasonalitySpec};
use crate::math::{fourier_features, hinge};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Days since the Unix epoch (fractional).
pub fn epoch_days(ds: NaiveDateTime) -> f64 {
    ds.and_utc().timestamp() as f64 / SECONDS_PER_DAY
}

/// Time scaled so the history spans `[0, 1]`.
pub fn scaled_time(t_start: NaiveDateTime, t_span_days: f64, ds: NaiveDateTime) -> f64 {
    (epoch_days(ds) - epoch_days(t_start)) / t_span_days
}

/// Fill a design row.
///
/// # Panics
/// Panics if `out` is shorter than
/// `2 + changepoints.len() + Σ season.width()`. Callers should size it from
/// the same inputs.
pub fn fill_design_row(
    changepoints: &[f64],
    seasonalities: &[SeasonalitySpec],
    t: f64,
    days: f64,
    out: &mut [f64],
) {
    out[0] = 1.0;
    out[1] = t;
    let mut col = 2;
    for &c in changepoints {
        out[col] = hinge(t, c);
        col += 1;
    }
    for season in seasonalities {
        let width = season.width();
        fourier_features(days, season.period_days, season.fourier_order, &mut out[col..col + width]);
        col += width;
    }
}

/// Predict `y(ds)` in original units.
pub fn predict(params: &ModelParams, ds: NaiveDateTime) -> f64 {
    let t = scaled_time(params.t_start, params.t_span_days, ds);
    let mut row = vec![0.0; params.design_len()];
    fill_design_row(&params.changepoints, &params.seasonalities, t, epoch_days(ds), &mut row);
    let scaled: f64 = row.iter().zip(&params.betas).map(|(x, b)| x * b).sum();
    scaled * params.y_scale
}
