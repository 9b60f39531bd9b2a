//! Formatted terminal output: run summary and forecast table.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{ForecastRow, RunConfig};
use crate::report::PresentationData;

/// Format the full run summary (dataset stats + fit diagnostics + model).
pub fn format_run_summary(data: &PresentationData, config: &RunConfig) -> String {
    let mut out = String::new();
    let forecast = &data.forecast;
    let report = &data.normalize_report;

    out.push_str("=== forecast - additive time-series forecast ===\n");
    out.push_str(&format!("Source: {}\n", data.source));
    out.push_str(&format!(
        "Variant: {:?} | horizon={} {}\n",
        config.variant,
        forecast.horizon.steps(),
        forecast.frequency.unit_label()
    ));

    let (t_lo, t_hi) = data.history.time_bounds();
    let (y_lo, y_hi) = data.history.value_bounds();
    out.push_str(&format!(
        "Rows: read={} used={} dropped={} | ds=[{}, {}] | y=[{:.3}, {:.3}]\n",
        report.rows_read,
        report.rows_used,
        report.rows_dropped(),
        fmt_ds(t_lo),
        fmt_ds(t_hi),
        y_lo,
        y_hi
    ));
    if report.ds_column != "ds" || report.y_column != "y" {
        out.push_str(&format!(
            "Columns: ds <- '{}', y <- '{}'\n",
            report.ds_column, report.y_column
        ));
    }

    let model = &forecast.model;
    out.push_str("\nModel:\n");
    out.push_str(&format!(
        "- trend: {} changepoint(s), prior scale {:.4}\n",
        model.changepoints.len(),
        model.prior_scale
    ));
    let seasons: Vec<String> = model
        .seasonalities
        .iter()
        .map(|s| format!("{} (order {})", s.name, s.fourier_order))
        .collect();
    out.push_str(&format!(
        "- seasonality: {}\n",
        if seasons.is_empty() { "none".to_string() } else { seasons.join(", ") }
    ));
    out.push_str(&format!(
        "- fit: RMSE={:.4} BIC={:.3} n={} k={}\n",
        forecast.quality.rmse, forecast.quality.bic, forecast.quality.n, forecast.quality.k
    ));
    out.push_str(&format!(
        "- interval: {:.0}% (sigma={:.4})\n",
        forecast.interval_width * 100.0,
        model.sigma
    ));
    out.push('\n');

    out
}

/// Format forecast rows as a fixed-width table.
///
/// At most `max_rows` rows are shown; the rest are summarised in a final line.
pub fn format_forecast_table(rows: &[ForecastRow], max_rows: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<19} {:>14} {:>14} {:>14}\n",
        "ds", "yhat", "yhat_lower", "yhat_upper"
    ));
    out.push_str(&format!("{:-<19} {:-<14} {:-<14} {:-<14}\n", "", "", "", ""));

    for r in rows.iter().take(max_rows) {
        out.push_str(&format!(
            "{:<19} {:>14.4} {:>14.4} {:>14.4}\n",
            fmt_ds(r.ds),
            r.yhat,
            r.yhat_lower,
            r.yhat_upper
        ));
    }
    if rows.len() > max_rows {
        out.push_str(&format!("... {} more row(s)\n", rows.len() - max_rows));
    }

    out
}

/// Date-only when the timestamp is midnight.
pub fn fmt_ds(ds: chrono::NaiveDateTime) -> String {
    if ds.time() == chrono::NaiveTime::MIN {
        ds.format("%Y-%m-%d").to_string()
    } else {
        ds.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
