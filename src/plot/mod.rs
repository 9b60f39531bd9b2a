//! Static chart backend.

pub mod ascii;

pub use ascii::*;
