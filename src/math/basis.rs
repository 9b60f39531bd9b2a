//! Basis functions for the additive model.
//!
//! - trend hinge: `h(t, c) = max(0, t - c)`; a coefficient on it is a slope
//!   change at changepoint `c`
//! - Fourier pair for a period `P` (in days) and order `k`:
//!   `sin(2πk d / P)`, `cos(2πk d / P)` where `d` is days since the epoch
//!
//! Seasonal terms use absolute days (not scaled time) so the phase of, say,
//! the weekly cycle does not depend on where the history happens to start.

use std::f64::consts::PI;

/// Slope-change basis for a changepoint at `c` (scaled time).
pub fn hinge(t: f64, c: f64) -> f64 {
    (t - c).max(0.0)
}

/// Write the `2 * order` Fourier features for `days` into `out`.
///
/// Layout: `[sin(1), cos(1), sin(2), cos(2), ...]`.
///
/// # Panics
/// Panics if `out.len() < 2 * order`.
pub fn fourier_features(days: f64, period_days: f64, order: usize, out: &mut [f64]) {
    for k in 0..order {
        let x = 2.0 * PI * (k as f64 + 1.0) * days / period_days;
        out[2 * k] = x.sin();
        out[2 * k + 1] = x.cos();
    }
}
