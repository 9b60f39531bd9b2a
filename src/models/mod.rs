//! Additive trend + seasonality model.
//!
//! Implemented as small, pure functions so that fitting/search code can stay
//! generic.

pub mod model;

pub use model::*;
