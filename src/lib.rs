//! `fin-forecast` library crate.
//!
//! The binary (`forecast`) is a thin wrapper around this library so that:
//!
//! - the fetch -> normalize -> forecast pipeline is testable without a terminal
//! - stores and forecasters can be swapped behind traits
//! - the CLI and the dashboard share one implementation

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod debug;
pub mod domain;
pub mod error;
pub mod fit;
pub mod forecast;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
pub mod tui;
