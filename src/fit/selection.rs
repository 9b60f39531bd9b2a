//! Prior-scale selection using BIC.
//!
//! Each candidate prior scale is fitted (in parallel) and scored with
//! - SSE / RMSE
//! - BIC = n * ln(SSE/n) + k * ln(n), `k` counting only active changepoints
//!
//! Selection rules:
//! 1. Choose the candidate with minimum BIC
//! 2. If a stronger-penalty (simpler) candidate is within ΔBIC < 2 of the
//!    best, pick the simplest such candidate
//! 3. Ties go to the earlier grid position, so results are deterministic

use rayon::prelude::*;

use crate::error::PipelineError;
use crate::fit::fitter::{CandidateFit, FitProblem, fit_candidate};

/// BIC difference below which the simpler candidate wins.
pub const BIC_SIMPLICITY_MARGIN: f64 = 2.0;

/// A candidate plus its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFit {
    pub fit: CandidateFit,
    pub bic: f64,
}

/// Output of fitting + selection.
#[derive(Debug, Clone)]
pub struct FitSelection {
    pub best: ScoredFit,
    /// Every candidate that solved, in grid order.
    pub candidates: Vec<ScoredFit>,
}

/// Fit every prior scale and select the best candidate.
///
/// `prior_scales` must be ordered from strongest to weakest penalty.
pub fn fit_and_select(problem: &FitProblem, prior_scales: &[f64]) -> Result<FitSelection, PipelineError> {
    let n = problem.n();
    if n == 0 {
        return Err(PipelineError::Forecast("No data points to fit.".to_string()));
    }
    if prior_scales.is_empty() {
        return Err(PipelineError::Forecast("Prior scale grid is empty.".to_string()));
    }

    let design = problem.design();
    let candidates: Vec<ScoredFit> = prior_scales
        .par_iter()
        .enumerate()
        .filter_map(|(idx, &scale)| fit_candidate(problem, &design, idx, scale))
        .map(|fit| ScoredFit {
            bic: bic(n, fit.sse, fit.k),
            fit,
        })
        .collect();

    if candidates.is_empty() {
        return Err(PipelineError::Forecast(
            "No prior scale produced a finite fit.".to_string(),
        ));
    }

    let best = select_by_bic(&candidates);
    tracing::debug!(
        prior_scale = best.fit.prior_scale,
        bic = best.bic,
        k = best.fit.k,
        candidates = candidates.len(),
        "selected prior scale"
    );

    Ok(FitSelection { best, candidates })
}

pub fn bic(n: usize, sse: f64, k: usize) -> f64 {
    let n_f = n as f64;
    let sse_per = (sse / n_f).max(1e-12);
    n_f * sse_per.ln() + (k as f64) * n_f.ln()
}

fn select_by_bic(candidates: &[ScoredFit]) -> ScoredFit {
    // Find minimum BIC (ties to the earlier grid index).
    let mut best = &candidates[0];
    for c in &candidates[1..] {
        if c.bic < best.bic || (c.bic == best.bic && c.fit.idx < best.fit.idx) {
            best = c;
        }
    }

    // Candidates arrive in grid order, strongest penalty first.
    candidates
        .iter()
        .filter(|c| c.fit.idx <= best.fit.idx)
        .find(|c| c.bic < best.bic + BIC_SIMPLICITY_MARGIN)
        .unwrap_or(best)
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(idx: usize, bic: f64) -> ScoredFit {
        ScoredFit {
            fit: CandidateFit {
                idx,
                prior_scale: 0.01 * (idx + 1) as f64,
                betas: Vec::new(),
                sse: 0.0,
                k: 2 + idx,
            },
            bic,
        }
    }

    #[test]
    fn bic_prefers_simpler_when_close() {
        let chosen = select_by_bic(&[scored(0, 11.5), scored(1, 10.0), scored(2, 9.0)]);
        // 11.5 is not within 2 of 9.0, 10.0 is.
        assert_eq!(chosen.fit.idx, 1);
    }

    #[test]
    fn bic_keeps_best_when_simpler_is_far() {
        let chosen = select_by_bic(&[scored(0, 30.0), scored(1, 20.0), scored(2, 5.0)]);
        assert_eq!(chosen.fit.idx, 2);
    }

    #[test]
    fn bic_penalises_parameters() {
        assert!(bic(100, 1.0, 5) > bic(100, 1.0, 2));
        assert!(bic(100, 2.0, 2) > bic(100, 1.0, 2));
        assert!(bic(100, 0.0, 2).is_finite());
    }

    #[test]
    fn selection_is_deterministic() {
        let n = 60;
        let t: Vec<f64> = (0..n).map(|i| i as f64 / (n - 1) as f64).collect();
        let problem = FitProblem {
            days: t.iter().map(|t| t * 59.0).collect(),
            y: t.iter().map(|&t| 0.5 + 0.3 * t + 0.2 * (t - 0.4f64).max(0.0)).collect(),
            t,
            changepoints: vec![0.2, 0.4, 0.6],
            seasonalities: Vec::new(),
        };
        let scales = [0.001, 0.01, 0.1, 1.0];
        let a = fit_and_select(&problem, &scales).unwrap();
        let b = fit_and_select(&problem, &scales).unwrap();
        assert_eq!(a.best, b.best);
        assert_eq!(a.candidates.len(), 4);
    }

    #[test]
    fn empty_grid_is_a_forecast_error() {
        let problem = FitProblem {
            t: vec![0.0, 1.0],
            days: vec![0.0, 1.0],
            y: vec![1.0, 2.0],
            changepoints: Vec::new(),
            seasonalities: Vec::new(),
        };
        assert!(matches!(fit_and_select(&problem, &[]), Err(PipelineError::Forecast(_))));
    }
}
