//! Low-level fitting routine for a single prior scale.
//!
//! Given:
//! - scaled times `t_i` and absolute days `d_i`
//! - scaled observations `y_i`
//! - changepoints and seasonal components
//!
//! we solve, for one changepoint prior scale `s`, the penalised problem
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2 + Σ_hinges (w_cp β_j)^2 + Σ_seasonal (w_season β_j)^2
//! w_cp = TREND_PENALTY / s
//! ```
//!
//! Intercept and base slope are unpenalised. The small seasonal penalty keeps
//! short histories (fewer rows than Fourier columns) solvable.

use nalgebra::{DMatrix, DVector};

use crate::domain::SeasonalitySpec;
use crate::math::{solve_least_squares, with_ridge_rows};
use crate::models::fill_design_row;

/// Hinge penalty numerator: `w_cp = TREND_PENALTY / prior_scale`.
pub const TREND_PENALTY: f64 = 0.1;
/// Ridge weight on each Fourier coefficient.
pub const SEASONAL_PENALTY: f64 = 0.01;
/// A changepoint whose slope change is below this (scaled units) does not
/// count towards the effective parameter count.
pub const ACTIVE_HINGE_EPS: f64 = 1e-3;

/// Everything needed to evaluate candidates, built once per forecast.
#[derive(Debug, Clone)]
pub struct FitProblem {
    pub t: Vec<f64>,
    pub days: Vec<f64>,
    pub y: Vec<f64>,
    pub changepoints: Vec<f64>,
    pub seasonalities: Vec<SeasonalitySpec>,
}

impl FitProblem {
    pub fn n(&self) -> usize {
        self.y.len()
    }

    /// Number of design columns.
    pub fn width(&self) -> usize {
        2 + self.changepoints.len() + self.seasonalities.iter().map(SeasonalitySpec::width).sum::<usize>()
    }

    pub fn seasonal_width(&self) -> usize {
        self.width() - 2 - self.changepoints.len()
    }

    /// Unweighted design matrix (shared by all candidates).
    pub fn design(&self) -> DMatrix<f64> {
        let n = self.n();
        let p = self.width();
        let mut x = DMatrix::<f64>::zeros(n, p);
        let mut row = vec![0.0; p];
        for i in 0..n {
            fill_design_row(&self.changepoints, &self.seasonalities, self.t[i], self.days[i], &mut row);
            for j in 0..p {
                x[(i, j)] = row[j];
            }
        }
        x
    }

    fn penalties(&self, prior_scale: f64) -> Vec<f64> {
        let mut out = vec![0.0; 2];
        out.extend(std::iter::repeat_n(TREND_PENALTY / prior_scale, self.changepoints.len()));
        out.extend(std::iter::repeat_n(SEASONAL_PENALTY, self.seasonal_width()));
        out
    }
}

/// One fitted candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFit {
    /// Position in the prior-scale grid (smaller = stronger penalty).
    pub idx: usize,
    pub prior_scale: f64,
    pub betas: Vec<f64>,
    /// Residual sum of squares in scaled units (penalty rows excluded).
    pub sse: f64,
    /// Effective parameter count.
    pub k: usize,
}

/// Fit one prior scale against a prebuilt design matrix.
///
/// Returns `None` when the solve fails or produces non-finite output.
pub fn fit_candidate(
    problem: &FitProblem,
    design: &DMatrix<f64>,
    idx: usize,
    prior_scale: f64,
) -> Option<CandidateFit> {
    if !(prior_scale.is_finite() && prior_scale > 0.0) {
        return None;
    }

    let y = DVector::from_column_slice(&problem.y);
    let (xa, ya) = with_ridge_rows(design, &y, &problem.penalties(prior_scale));
    let beta = solve_least_squares(&xa, &ya)?;

    let fitted = design * &beta;
    let sse: f64 = (0..problem.n()).map(|i| (problem.y[i] - fitted[i]).powi(2)).sum();
    if !sse.is_finite() {
        return None;
    }

    let hinges = &beta.as_slice()[2..2 + problem.changepoints.len()];
    let active = hinges.iter().filter(|d| d.abs() > ACTIVE_HINGE_EPS).count();

    Some(CandidateFit {
        idx,
        prior_scale,
        betas: beta.iter().copied().collect(),
        sse,
        k: 2 + active + problem.seasonal_width(),
    })
}
