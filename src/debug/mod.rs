//! Debug bundle writer for inspecting raw inputs, normalization, and the fitted model.

use std::fmt::Write as _;
use std::fs::{create_dir_all, write};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::domain::{RawResultSet, RunConfig};
use crate::error::PipelineError;
use crate::report::{PresentationData, fmt_ds};

/// Directory bundles are written to (relative to the working directory).
pub const DEBUG_DIR: &str = "debug";

/// Rows of the raw result set copied into the bundle.
const RAW_PREVIEW_ROWS: usize = 10;
/// Dropped-row reasons copied into the bundle.
const MAX_ROW_ISSUES: usize = 50;
/// Forecast rows shown at the head and tail of the bundle's table.
const FORECAST_EDGE_ROWS: usize = 5;

/// Write a markdown bundle for one run into `dir` and return its path.
pub fn write_debug_bundle(
    dir: &Path,
    raw: Option<&RawResultSet>,
    data: &PresentationData,
    config: &RunConfig,
) -> Result<PathBuf, PipelineError> {
    create_dir_all(dir).map_err(|e| PipelineError::Export(format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!(
        "forecast_debug_{}_h{}_{ts}.md",
        format!("{:?}", config.variant).to_lowercase(),
        data.forecast.horizon.steps()
    ));

    write(&path, render_debug_bundle(raw, data, config))
        .map_err(|e| PipelineError::Export(format!("Failed to write debug bundle '{}': {e}", path.display())))?;

    tracing::info!(path = %path.display(), "wrote debug bundle");
    Ok(path)
}

/// Render the bundle contents.
pub fn render_debug_bundle(raw: Option<&RawResultSet>, data: &PresentationData, config: &RunConfig) -> String {
    let mut out = String::new();
    let forecast = &data.forecast;
    let report = &data.normalize_report;

    // Writing to a String cannot fail.
    let _ = writeln!(out, "# forecast debug bundle");
    let _ = writeln!(out, "- generated: {}", Local::now().to_rfc3339());
    let _ = writeln!(out, "- source: {}", data.source);
    let _ = writeln!(
        out,
        "- query: table={} date_col={} value_col={}",
        config.table, config.date_col, config.value_col
    );
    let _ = writeln!(
        out,
        "- variant: {:?} | chart: {:?} | horizon: {} {}",
        config.variant,
        config.chart,
        forecast.horizon.steps(),
        forecast.frequency.unit_label()
    );
    let _ = writeln!(out, "- interval_width: {:.2}", forecast.interval_width);

    if let Some(raw) = raw {
        let _ = writeln!(out, "\n## Raw result set");
        let _ = writeln!(out, "rows={} columns={:?}\n", raw.len(), raw.columns);
        let _ = writeln!(out, "| # | {} |", raw.columns.join(" | "));
        let _ = writeln!(out, "|{}", " - |".repeat(raw.columns.len() + 1));
        for (idx, row) in raw.rows.iter().take(RAW_PREVIEW_ROWS).enumerate() {
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            let _ = writeln!(out, "| {idx} | {} |", cells.join(" | "));
        }
        if raw.len() > RAW_PREVIEW_ROWS {
            let _ = writeln!(out, "\n... {} more row(s)", raw.len() - RAW_PREVIEW_ROWS);
        }
    }

    let _ = writeln!(out, "\n## Normalization");
    let _ = writeln!(
        out,
        "- columns: ds <- '{}', y <- '{}'",
        report.ds_column, report.y_column
    );
    let _ = writeln!(
        out,
        "- rows: read={} used={} dropped={}",
        report.rows_read,
        report.rows_used,
        report.rows_dropped()
    );
    if !report.row_issues.is_empty() {
        let _ = writeln!(out, "\n| row | reason |");
        let _ = writeln!(out, "| - | - |");
        for issue in report.row_issues.iter().take(MAX_ROW_ISSUES) {
            let _ = writeln!(out, "| {} | {} |", issue.row, issue.message);
        }
        if report.row_issues.len() > MAX_ROW_ISSUES {
            let _ = writeln!(out, "\n... {} more issue(s)", report.row_issues.len() - MAX_ROW_ISSUES);
        }
    }

    let (t_lo, t_hi) = data.history.time_bounds();
    let (y_lo, y_hi) = data.history.value_bounds();
    let _ = writeln!(out, "\n## Canonical series");
    let _ = writeln!(out, "- n: {}", data.history.len());
    let _ = writeln!(out, "- ds: {} .. {}", fmt_ds(t_lo), fmt_ds(t_hi));
    let _ = writeln!(out, "- y: {y_lo:.6} .. {y_hi:.6}");

    let model = &forecast.model;
    let _ = writeln!(out, "\n## Model");
    let _ = writeln!(out, "- t_start: {} | span_days: {:.3}", fmt_ds(model.t_start), model.t_span_days);
    let _ = writeln!(out, "- y_scale: {:.6}", model.y_scale);
    let _ = writeln!(out, "- prior_scale: {:.6}", model.prior_scale);
    let _ = writeln!(out, "- sigma: {:.6}", model.sigma);
    let _ = writeln!(
        out,
        "- quality: sse={:.6} rmse={:.6} bic={:.3} n={} k={}",
        forecast.quality.sse, forecast.quality.rmse, forecast.quality.bic, forecast.quality.n, forecast.quality.k
    );
    let _ = writeln!(out, "- intercept: {:.6} | slope: {:.6}", beta(&model.betas, 0), beta(&model.betas, 1));

    if !model.changepoints.is_empty() {
        let _ = writeln!(out, "\n### Changepoints");
        let _ = writeln!(out, "| t | delta |");
        let _ = writeln!(out, "| - | - |");
        for (j, c) in model.changepoints.iter().enumerate() {
            let _ = writeln!(out, "| {c:.4} | {:.6} |", beta(&model.betas, 2 + j));
        }
    }

    let mut col = 2 + model.changepoints.len();
    for season in &model.seasonalities {
        let width = season.width();
        let coefs: Vec<String> = (col..col + width).map(|j| format!("{:.4}", beta(&model.betas, j))).collect();
        let _ = writeln!(
            out,
            "\n### Seasonality: {} (period {:.2}d, order {})\n[{}]",
            season.name,
            season.period_days,
            season.fourier_order,
            coefs.join(", ")
        );
        col += width;
    }

    let _ = writeln!(out, "\n## Forecast rows");
    let _ = writeln!(out, "| ds | yhat | yhat_lower | yhat_upper |");
    let _ = writeln!(out, "| - | - | - | - |");
    let rows = &forecast.rows;
    let edge = |out: &mut String, r: &crate::domain::ForecastRow| {
        let _ = writeln!(
            out,
            "| {} | {:.4} | {:.4} | {:.4} |",
            fmt_ds(r.ds),
            r.yhat,
            r.yhat_lower,
            r.yhat_upper
        );
    };
    if rows.len() <= 2 * FORECAST_EDGE_ROWS {
        rows.iter().for_each(|r| edge(&mut out, r));
    } else {
        rows[..FORECAST_EDGE_ROWS].iter().for_each(|r| edge(&mut out, r));
        let _ = writeln!(out, "| ... | | | |");
        rows[rows.len() - FORECAST_EDGE_ROWS..].iter().for_each(|r| edge(&mut out, r));
    }

    out
}

fn beta(betas: &[f64], idx: usize) -> f64 {
    betas.get(idx).copied().unwrap_or(f64::NAN)
}
