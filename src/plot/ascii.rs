//! ASCII plotting for terminal output (the static chart backend).
//!
//! A fixed-size character grid, used for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - historical observations: `o`
//! - model prediction (history + future): `-` line
//! - interval bounds over the forecast steps: `:`
//! - start of the forecast: `|` column

use chrono::NaiveDateTime;

use crate::domain::{Forecast, ForecastRow, Observation};
use crate::models::epoch_days;
use crate::report::fmt_ds;

/// Render history and forecast on one fixed-size grid.
pub fn render_forecast_plot(history: &[Observation], forecast: &Forecast, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let Some((t_min, t_max)) = time_range(history, &forecast.rows) else {
        return "Plot: nothing to draw\n".to_string();
    };
    let (y_min, y_max) = y_range(history, &forecast.rows).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);
    let (d_min, d_max) = (epoch_days(t_min), epoch_days(t_max));

    let mut grid = vec![vec![' '; width]; height];
    let to_xy = |ds: NaiveDateTime, y: f64| {
        (
            map_x(epoch_days(ds), d_min, d_max, width),
            map_y(y, y_min, y_max, height),
        )
    };

    // Prediction line first; bands and the separator only fill empty cells.
    let line: Vec<(usize, usize)> = forecast.rows.iter().map(|r| to_xy(r.ds, r.yhat)).collect();
    draw_polyline(&mut grid, &line, '-');

    let future = forecast.future_rows();
    let lower: Vec<(usize, usize)> = future.iter().map(|r| to_xy(r.ds, r.yhat_lower)).collect();
    let upper: Vec<(usize, usize)> = future.iter().map(|r| to_xy(r.ds, r.yhat_upper)).collect();
    draw_polyline(&mut grid, &lower, ':');
    draw_polyline(&mut grid, &upper, ':');

    if let Some(first) = future.first() {
        let (x, _) = to_xy(first.ds, first.yhat);
        for row in grid.iter_mut() {
            if row[x] == ' ' {
                row[x] = '|';
            }
        }
    }

    for p in history {
        let (x, y) = to_xy(p.ds, p.y);
        grid[y][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: ds=[{}, {}] | y=[{y_min:.2}, {y_max:.2}] | history=o forecast=- interval=:\n",
        fmt_ds(t_min),
        fmt_ds(t_max)
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn time_range(history: &[Observation], rows: &[ForecastRow]) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let mut all = history.iter().map(|p| p.ds).chain(rows.iter().map(|r| r.ds));
    let first = all.next()?;
    let (lo, hi) = all.fold((first, first), |(lo, hi), ds| (lo.min(ds), hi.max(ds)));
    if hi > lo { Some((lo, hi)) } else { None }
}

fn y_range(history: &[Observation], rows: &[ForecastRow]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for p in history {
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    for r in rows {
        min_y = min_y.min(r.yhat_lower.min(r.yhat));
        max_y = max_y.max(r.yhat_upper.max(r.yhat));
    }

    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_polyline(grid: &mut [Vec<char>], points: &[(usize, usize)], ch: char) {
    let mut prev: Option<(usize, usize)> = None;
    for &(x, y) in points {
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, x, y, ch),
            None => {
                if grid[y][x] == ' ' {
                    grid[y][x] = ch;
                }
            }
        }
        prev = Some((x, y));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
