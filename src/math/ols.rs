//! Least squares solver.
//!
//! Every candidate fit solves one linear problem of the form:
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2 + Σ_j (λ_j β_j)^2
//! ```
//!
//! The ridge part is expressed as extra rows appended to the design matrix
//! (`λ_j` on the diagonal, zero targets), so the solver itself stays a plain
//! least-squares routine.
//!
//! Implementation choices:
//! - SVD so tall (more rows than columns) and rank-deficient systems both
//!   solve without panicking. Nalgebra's `QR::solve` is intended for square
//!   systems.
//! - The parameter dimension is small (tens of columns), so SVD cost is
//!   dominated by the row count and stays cheap for daily series.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Append ridge rows `diag(penalties)` with zero targets below `x`/`y`.
///
/// A zero penalty leaves that coefficient unregularised.
pub fn with_ridge_rows(x: &DMatrix<f64>, y: &DVector<f64>, penalties: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
    debug_assert_eq!(penalties.len(), x.ncols());
    let n = x.nrows();
    let p = x.ncols();
    let extra: Vec<usize> = (0..p).filter(|&j| penalties[j] > 0.0).collect();

    let mut xa = DMatrix::<f64>::zeros(n + extra.len(), p);
    xa.rows_mut(0, n).copy_from(x);
    let mut ya = DVector::<f64>::zeros(n + extra.len());
    ya.rows_mut(0, n).copy_from(y);

    for (row, &j) in extra.iter().enumerate() {
        xa[(n + row, j)] = penalties[j];
    }
    (xa, ya)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn ridge_rows_shrink_penalised_coefficient() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let (xa, ya) = with_ridge_rows(&x, &y, &[0.0, 10.0]);
        assert_eq!(xa.nrows(), 4);
        assert_eq!(ya.len(), 4);

        let beta = solve_least_squares(&xa, &ya).unwrap();
        assert!(beta[1].abs() < 3.0);
        assert!(beta[1] > 0.0);
    }
}
