//! Additive model fitting orchestration.
//!
//! Responsibilities:
//!
//! - generate the prior-scale grid and changepoint locations
//! - evaluate each candidate prior scale (parallel)
//! - select the best candidate using BIC + a simplicity margin

pub mod fitter;
pub mod grid;
pub mod selection;

pub use fitter::*;
pub use grid::*;
pub use selection::*;
