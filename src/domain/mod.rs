//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - raw store output (`RawValue`, `RawResultSet`)
//! - the validated model input (`CanonicalSeries`)
//! - run configuration (`Variant`, `Horizon`, `RunConfig`, ...)
//! - forecast outputs (`ForecastRow`, `Forecast`, `ModelParams`)

pub mod types;

pub use types::*;
