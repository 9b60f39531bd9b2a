//! Search grids for the additive fit.
//!
//! - prior scales: a deterministic log-spaced grid; each value is one
//!   candidate fit
//! - changepoints: evenly spaced over the earliest part of the history, at
//!   observed timestamps

/// Default changepoint prior-scale grid bounds.
pub const PRIOR_SCALE_MIN: f64 = 0.001;
pub const PRIOR_SCALE_MAX: f64 = 0.5;
pub const PRIOR_SCALE_STEPS: usize = 8;

/// Maximum number of trend changepoints.
pub const MAX_CHANGEPOINTS: usize = 25;
/// Share of the history (by row count) eligible for changepoints.
pub const CHANGEPOINT_RANGE: f64 = 0.8;

/// The default prior-scale grid, smallest (strongest penalty) first.
pub fn default_prior_scales() -> Vec<f64> {
    log_space(PRIOR_SCALE_MIN, PRIOR_SCALE_MAX, PRIOR_SCALE_STEPS)
}

/// `steps` log-spaced points from `min` to `max` inclusive (`steps >= 2`, `0 < min < max`).
fn log_space(min: f64, max: f64, steps: usize) -> Vec<f64> {
    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);
    (0..steps).map(|i| (ln_min + step * i as f64).exp()).collect()
}

/// Changepoint locations for sorted scaled times `t_sorted`.
///
/// Candidates are the observed times at evenly spaced indices over the first
/// `range` share of rows, excluding the very first row. Duplicates (repeated
/// timestamps) collapse to one changepoint.
pub fn changepoint_grid(t_sorted: &[f64], max_changepoints: usize, range: f64) -> Vec<f64> {
    let hist_size = (t_sorted.len() as f64 * range.clamp(0.0, 1.0)).floor() as usize;
    if hist_size < 2 || max_changepoints == 0 {
        return Vec::new();
    }
    let count = max_changepoints.min(hist_size - 1);
    let last = (hist_size - 1) as f64;

    let mut out: Vec<f64> = (1..=count)
        .map(|i| {
            let idx = (last * i as f64 / count as f64).round() as usize;
            t_sorted[idx]
        })
        .filter(|&c| c > 0.0 && c < 1.0)
        .collect();
    out.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_is_strongest_penalty_first() {
        let grid = default_prior_scales();
        assert_eq!(grid.len(), PRIOR_SCALE_STEPS);
        assert!(grid.windows(2).all(|w| w[0] < w[1]));
        assert!((grid[0] - PRIOR_SCALE_MIN).abs() < 1e-12);
        assert!((grid[PRIOR_SCALE_STEPS - 1] - PRIOR_SCALE_MAX).abs() < 1e-12);
    }

    #[test]
    fn changepoints_cover_first_eighty_percent() {
        let t: Vec<f64> = (0..100).map(|i| i as f64 / 99.0).collect();
        let cps = changepoint_grid(&t, MAX_CHANGEPOINTS, CHANGEPOINT_RANGE);
        assert_eq!(cps.len(), 25);
        assert!(cps.windows(2).all(|w| w[0] < w[1]));
        assert!(*cps.last().unwrap() <= 0.8);
        assert!(cps[0] > 0.0);
    }

    #[test]
    fn short_histories_get_few_or_no_changepoints() {
        assert!(changepoint_grid(&[0.0, 1.0], MAX_CHANGEPOINTS, CHANGEPOINT_RANGE).is_empty());
        let t: Vec<f64> = (0..5).map(|i| i as f64 / 4.0).collect();
        // hist_size = 4 -> at most 3 changepoints
        assert_eq!(changepoint_grid(&t, MAX_CHANGEPOINTS, CHANGEPOINT_RANGE).len(), 3);
    }
}
