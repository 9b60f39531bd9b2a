//! Command-line parsing for the `forecast` binary.
//!
//! Parsing and dispatch live apart from the pipeline; `app` turns these
//! structs into a [`RunConfig`](crate::domain::RunConfig).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{ChartBackend, SourceKind, Variant};

pub mod picker;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "forecast", version, about = "Time-series forecaster for warehouse tables")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch, normalize and forecast once; print the summary and forecast table.
    Run(RunArgs),
    /// Launch the interactive dashboard (the default).
    Tui(RunArgs),
    /// Plot a run file written by `forecast run --export-json`.
    Plot(PlotArgs),
}

/// Options shared by `run` and `tui`.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Where the result set comes from.
    #[arg(long, value_enum, default_value_t = SourceKind::Snowflake)]
    pub source: SourceKind,

    /// CSV table for `--source csv` (prompts when omitted).
    #[arg(long, value_name = "CSV")]
    pub csv: Option<PathBuf>,

    /// Secrets TOML with a `[snowflake]` table (defaults to SNOWFLAKE_* env vars).
    #[arg(long, value_name = "TOML")]
    pub secrets: Option<PathBuf>,

    /// Table to query.
    #[arg(long, default_value = "forecast_data")]
    pub table: String,

    /// Timestamp column.
    #[arg(long, default_value = "ds")]
    pub date_col: String,

    /// Value column.
    #[arg(long, default_value = "y")]
    pub value_col: String,

    /// Daily steps (adjustable horizon) or month-end steps (fixed 32 months).
    #[arg(long, value_enum, default_value_t = Variant::Daily)]
    pub variant: Variant,

    /// Forecast horizon in steps (defaults to 90 days / 32 months).
    #[arg(long)]
    pub horizon: Option<u32>,

    /// Chart backend for `run`.
    #[arg(long, value_enum, default_value_t = ChartBackend::Static)]
    pub chart: ChartBackend,

    /// Verbose logging and a raw-row preview.
    #[arg(long)]
    pub debug: bool,

    /// Seed for the synthetic source.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Probability mass of the prediction interval.
    #[arg(long, default_value_t = 0.80)]
    pub interval_width: f64,

    /// Row count for the synthetic source.
    #[arg(long, default_value_t = 730)]
    pub synthetic_rows: usize,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Forecast rows to print (0 = all).
    #[arg(long, default_value_t = 20)]
    pub rows: usize,

    /// Export forecast rows to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// Export the full run (model + rows) to JSON.
    #[arg(long = "export-json", value_name = "JSON")]
    pub export_json: Option<PathBuf>,

    /// Write a markdown debug bundle under `debug/`.
    #[arg(long)]
    pub debug_bundle: bool,
}

/// Options for plotting a saved run.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Run JSON produced by `forecast run --export-json`.
    #[arg(long, value_name = "JSON")]
    pub run: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_parse() {
        let cli = Cli::parse_from([
            "forecast",
            "run",
            "--source",
            "synthetic",
            "--variant",
            "monthly",
            "--chart",
            "static",
            "--horizon",
            "32",
            "--export",
            "out.csv",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.source, SourceKind::Synthetic);
        assert_eq!(args.variant, Variant::Monthly);
        assert_eq!(args.horizon, Some(32));
        assert_eq!(args.export, Some(PathBuf::from("out.csv")));
        assert_eq!(args.date_col, "ds");
    }

    #[test]
    fn plot_requires_run_file() {
        assert!(Cli::try_parse_from(["forecast", "plot"]).is_err());
        assert!(Cli::try_parse_from(["forecast", "plot", "--run", "r.json"]).is_ok());
    }
}
