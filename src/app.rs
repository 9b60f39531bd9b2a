//! Top-level application orchestration.
//!
//! `src/main.rs` only maps errors to exit codes; this module:
//! - parses CLI arguments and builds a [`RunConfig`]
//! - sets up logging
//! - runs the pipeline once (`run`) or hands off to the dashboard (`tui`)
//! - prints reports/plots and writes optional exports

use std::path::Path;

use clap::Parser;
use tracing::info;

use crate::cli::{Command, PlotArgs, RunArgs};
use crate::domain::{ChartBackend, Horizon, RunConfig, SourceKind};
use crate::error::{AppError, PipelineError};
use crate::logging::LogSink;
use crate::report::PresentationData;

pub mod pipeline;

/// Entry point for the `forecast` binary.
pub fn run() -> Result<(), AppError> {
    // `forecast` and `forecast --source csv` behave like `forecast tui ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Tui(args) => handle_tui(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let (config, horizon) = resolve(&args)?;
    if config.chart == ChartBackend::Interactive {
        return launch_dashboard(config, horizon);
    }

    crate::logging::init(LogSink::Stderr, config.debug)?;
    info!(source = ?config.source, variant = ?config.variant, horizon = horizon.steps(), "starting run");

    let data = pipeline::run(&config, horizon)?;

    // A failed export aborts the run before anything is printed.
    let written = write_outputs(&data, &config)?;

    println!("{}", crate::report::format_run_summary(&data, &config));
    println!("{}", crate::report::format_forecast_table(data.forecast.future_rows(), config.table_rows));
    println!(
        "{}",
        crate::plot::render_forecast_plot(data.history.points(), &data.forecast, config.plot_width, config.plot_height)
    );
    for line in written {
        println!("{line}");
    }

    Ok(())
}

/// Write the requested exports and debug bundle, returning one status line each.
fn write_outputs(data: &PresentationData, config: &RunConfig) -> Result<Vec<String>, PipelineError> {
    let mut written = Vec::new();
    if let Some(path) = &config.export_csv {
        crate::io::export::write_forecast_csv(path, &data.forecast.rows)?;
        written.push(format!("Wrote {} row(s) to {}", data.forecast.rows.len(), path.display()));
    }
    if let Some(path) = &config.export_json {
        crate::io::run_file::write_run_json(path, data)?;
        written.push(format!("Wrote run file {}", path.display()));
    }
    if config.debug_bundle {
        let path = crate::debug::write_debug_bundle(Path::new(crate::debug::DEBUG_DIR), None, data, config)?;
        written.push(format!("Wrote debug bundle {}", path.display()));
    }
    Ok(written)
}

fn handle_tui(args: RunArgs) -> Result<(), AppError> {
    let (mut config, horizon) = resolve(&args)?;
    config.chart = ChartBackend::Interactive;
    launch_dashboard(config, horizon)
}

fn launch_dashboard(config: RunConfig, horizon: Horizon) -> Result<(), AppError> {
    crate::logging::init(LogSink::for_dashboard(config.debug), config.debug)?;
    crate::tui::run(config, horizon)
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let run = crate::io::run_file::read_run_json(&args.run)?;
    println!("Run: {} ({})", run.source, run.generated_at.format("%Y-%m-%d %H:%M:%S"));
    println!(
        "{}",
        crate::plot::render_forecast_plot(&run.history, &run.forecast, args.width, args.height)
    );
    Ok(())
}

/// Build the config and horizon, prompting for a CSV file when needed.
fn resolve(args: &RunArgs) -> Result<(RunConfig, Horizon), PipelineError> {
    let mut config = run_config_from_args(args);
    if config.source == SourceKind::Csv && config.csv_path.is_none() {
        config.csv_path = Some(crate::cli::picker::prompt_for_csv_path()?);
    }
    let horizon = horizon_from_args(args, &config)?;
    Ok((config, horizon))
}

/// Map parsed flags onto a [`RunConfig`].
pub fn run_config_from_args(args: &RunArgs) -> RunConfig {
    RunConfig {
        source: args.source,
        csv_path: args.csv.clone(),
        secrets_path: args.secrets.clone(),
        table: args.table.clone(),
        date_col: args.date_col.clone(),
        value_col: args.value_col.clone(),
        variant: args.variant,
        chart: args.chart,
        debug: args.debug,
        interval_width: args.interval_width,
        seed: args.seed,
        synthetic_rows: args.synthetic_rows,
        plot_width: args.width,
        plot_height: args.height,
        table_rows: args.rows,
        export_csv: args.export.clone(),
        export_json: args.export_json.clone(),
        debug_bundle: args.debug_bundle,
    }
}

/// `--horizon` checked against the variant's range, or the variant default.
pub fn horizon_from_args(args: &RunArgs, config: &RunConfig) -> Result<Horizon, PipelineError> {
    let range = config.horizon_range();
    match args.horizon {
        Some(steps) => Horizon::new(steps, range),
        None => Ok(Horizon::default_for(range)),
    }
}

/// Rewrite argv so `forecast` defaults to `forecast tui`.
///
/// Rules:
/// - `forecast`                      -> `forecast tui`
/// - `forecast --source csv ...`     -> `forecast tui --source csv ...`
/// - `forecast --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("tui".to_string());
        return argv;
    };

    if matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help") {
        return argv;
    }
    if matches!(arg1.as_str(), "run" | "tui" | "plot") {
        return argv;
    }

    // A leading flag belongs to the default subcommand.
    if arg1.starts_with('-') {
        argv.insert(1, "tui".to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::Variant;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["forecast", "run"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Run(a) => a,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn bare_invocation_defaults_to_tui() {
        assert_eq!(rewrite_args(args(&["forecast"])), args(&["forecast", "tui"]));
        assert_eq!(
            rewrite_args(args(&["forecast", "--variant", "monthly"])),
            args(&["forecast", "tui", "--variant", "monthly"])
        );
        assert_eq!(rewrite_args(args(&["forecast", "--help"])), args(&["forecast", "--help"]));
        assert_eq!(rewrite_args(args(&["forecast", "plot", "--run", "x.json"]))[1], "plot");
    }

    #[test]
    fn horizon_defaults_follow_variant() {
        let a = run_args(&[]);
        let cfg = run_config_from_args(&a);
        assert_eq!(horizon_from_args(&a, &cfg).unwrap().steps(), 90);

        let a = run_args(&["--variant", "monthly"]);
        let cfg = run_config_from_args(&a);
        assert_eq!(cfg.variant, Variant::Monthly);
        assert_eq!(horizon_from_args(&a, &cfg).unwrap().steps(), 32);
    }

    #[test]
    fn out_of_range_horizon_is_config_error() {
        let a = run_args(&["--horizon", "400"]);
        let cfg = run_config_from_args(&a);
        let err = horizon_from_args(&a, &cfg).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert_eq!(AppError::from(err).exit_code(), 2);
    }

    #[test]
    fn failed_export_stops_before_later_outputs() {
        let data = crate::report::tests::sample_presentation();
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("run.json");
        let config = RunConfig {
            // A directory cannot be opened as a CSV file.
            export_csv: Some(dir.path().to_path_buf()),
            export_json: Some(json.clone()),
            ..RunConfig::default()
        };

        let err = write_outputs(&data, &config).unwrap_err();
        assert!(matches!(err, PipelineError::Export(_)));
        assert_eq!(AppError::from(err).exit_code(), 2);
        assert!(!json.exists());
    }

    #[test]
    fn outputs_report_each_written_file() {
        let data = crate::report::tests::sample_presentation();
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("out.csv");
        let config = RunConfig { export_csv: Some(csv.clone()), ..RunConfig::default() };

        let written = write_outputs(&data, &config).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].starts_with(&format!("Wrote {} row(s)", data.forecast.rows.len())));
        assert!(csv.exists());
    }

    #[test]
    fn flags_map_onto_config() {
        let a = run_args(&[
            "--source",
            "csv",
            "--csv",
            "data.csv",
            "--date-col",
            "DATE",
            "--rows",
            "5",
            "--interval-width",
            "0.9",
            "--debug-bundle",
        ]);
        let cfg = run_config_from_args(&a);
        assert_eq!(cfg.source, SourceKind::Csv);
        assert_eq!(cfg.csv_path.as_deref(), Some(Path::new("data.csv")));
        assert_eq!(cfg.date_col, "DATE");
        assert_eq!(cfg.table_rows, 5);
        assert!((cfg.interval_width - 0.9).abs() < 1e-12);
        assert!(cfg.debug_bundle);
        assert_eq!(cfg.chart, ChartBackend::Static);
    }
}
