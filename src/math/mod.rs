//! Mathematical utilities: basis functions, least squares, normal quantiles.

pub mod basis;
pub mod ols;
pub mod stats;

pub use basis::*;
pub use ols::*;
pub use stats::*;
