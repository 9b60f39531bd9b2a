//! Ratatui-based terminal dashboard (the interactive chart backend).
//!
//! The dashboard fetches the result set once, then refits whenever the
//! horizon control moves. `r` re-queries the store; everything else works on
//! the memoized raw result set.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Row, Table, Wrap},
};

use crate::app::pipeline::{PipelineRun, Stage, run_with_records};
use crate::data::{StoreConnector, connector_for};
use crate::domain::{Horizon, HorizonRange, RawResultSet, RunConfig};
use crate::error::{AppError, PipelineError};
use crate::forecast::AdditiveForecaster;
use crate::io::export::{DEFAULT_EXPORT_NAME, write_forecast_csv};
use crate::models::epoch_days;
use crate::report::{PresentationData, fmt_ds};

mod plotters_chart;

use plotters_chart::ForecastPlottersChart;

/// Horizon change for PgUp/PgDn.
const PAGE_STEP: i64 = 30;

/// Start the dashboard.
pub fn run(config: RunConfig, horizon: Horizon) -> Result<(), AppError> {
    // Resolve the store before touching the terminal so config errors print normally.
    let connector = connector_for(&config)?;

    let _guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(4, format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(config, connector, horizon);
    app.refresh();
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(4, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(4, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct App {
    config: RunConfig,
    range: HorizonRange,
    horizon: Horizon,
    connector: Box<dyn StoreConnector>,
    raw: Option<RawResultSet>,
    data: Option<PresentationData>,
    error: Option<PipelineError>,
    stage: Stage,
    show_table: bool,
    table_scroll: usize,
    status: String,
}

impl App {
    fn new(config: RunConfig, connector: Box<dyn StoreConnector>, horizon: Horizon) -> Self {
        let range = config.horizon_range();
        Self {
            range,
            horizon: horizon.shifted(0, range),
            connector,
            raw: None,
            data: None,
            error: None,
            stage: Stage::Idle,
            show_table: false,
            table_scroll: 0,
            status: String::new(),
            config,
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(4, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(4, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the dashboard should exit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Left => self.move_horizon(-1),
            KeyCode::Right => self.move_horizon(1),
            KeyCode::PageDown => self.move_horizon(-PAGE_STEP),
            KeyCode::PageUp => self.move_horizon(PAGE_STEP),
            KeyCode::Up => self.table_scroll = self.table_scroll.saturating_sub(1),
            KeyCode::Down => self.table_scroll = self.table_scroll.saturating_add(1),
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('t') => {
                self.show_table = !self.show_table;
                self.table_scroll = 0;
            }
            KeyCode::Char('e') => self.export(),
            KeyCode::Char('d') => self.write_debug_bundle(),
            _ => {}
        }
        false
    }

    fn move_horizon(&mut self, delta: i64) {
        let next = self.horizon.shifted(delta, self.range);
        if next == self.horizon {
            if self.range.is_fixed() {
                self.status = format!(
                    "Horizon is fixed at {} {}.",
                    self.horizon.steps(),
                    self.config.frequency().unit_label()
                );
            }
            return;
        }
        self.horizon = next;
        self.recompute();
    }

    /// Re-query the store, then recompute.
    fn refresh(&mut self) {
        let forecaster = match AdditiveForecaster::new(self.config.interval_width) {
            Ok(f) => f,
            Err(err) => return self.set_error(err),
        };
        let mut run = PipelineRun::new(&self.config, &forecaster);
        let fetched = run.fetch(self.connector.as_ref());
        self.stage = run.stage().clone();

        match fetched {
            Ok(raw) => {
                self.raw = Some(raw);
                self.recompute();
            }
            Err(err) => {
                self.raw = None;
                self.set_error(err);
            }
        }
    }

    /// Normalize + forecast from the memoized raw result set.
    fn recompute(&mut self) {
        let Some(raw) = &self.raw else {
            self.status = "No data loaded; press r to fetch.".to_string();
            return;
        };

        match run_with_records(&self.config, self.connector.describe(), raw, self.horizon) {
            Ok(data) => {
                self.status = format!(
                    "Forecast {} {} from {} row(s) ({} dropped).",
                    self.horizon.steps(),
                    self.config.frequency().unit_label(),
                    data.normalize_report.rows_used,
                    data.normalize_report.rows_dropped()
                );
                self.data = Some(data);
                self.error = None;
                self.stage = Stage::Done;
            }
            Err(err) => self.set_error(err),
        }
    }

    fn set_error(&mut self, err: PipelineError) {
        tracing::error!(stage = %err.stage(), error = %err, "pipeline failed");
        self.status = format!("Failed while {}.", err.stage());
        self.stage = Stage::Failed(err.to_string());
        // No partial presentation of a failed run.
        self.data = None;
        self.error = Some(err);
    }

    fn export(&mut self) {
        let Some(data) = &self.data else {
            self.status = "Nothing to export.".to_string();
            return;
        };
        let path = self
            .config
            .export_csv
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_NAME));
        self.status = match write_forecast_csv(&path, &data.forecast.rows) {
            Ok(()) => format!("Exported {} row(s) to {}", data.forecast.rows.len(), path.display()),
            Err(err) => format!("{err}"),
        };
    }

    fn write_debug_bundle(&mut self) {
        let Some(data) = &self.data else {
            self.status = "No successful run to dump.".to_string();
            return;
        };
        let dir = PathBuf::from(crate::debug::DEBUG_DIR);
        self.status = match crate::debug::write_debug_bundle(&dir, self.raw.as_ref(), data, &self.config) {
            Ok(path) => format!("Wrote debug bundle: {}", path.display()),
            Err(err) => format!("Debug write failed: {err}"),
        };
    }

    fn draw(&self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(5),
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_horizon(frame, chunks[1]);
        self.draw_body(frame, chunks[2]);
        self.draw_footer(frame, chunks[3]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("forecast", Style::default().fg(Color::Cyan)),
            Span::raw(format!(" | {}", self.connector.describe())),
        ]));
        lines.push(Line::from(Span::styled(
            format!(
                "variant: {:?} | stage: {} | interval: {:.0}%",
                self.config.variant,
                self.stage,
                self.config.interval_width * 100.0
            ),
            Style::default().fg(Color::Gray),
        )));

        if let Some(data) = &self.data {
            let report = &data.normalize_report;
            let quality = &data.forecast.quality;
            lines.push(Line::from(Span::styled(
                format!(
                    "rows: read={} used={} dropped={} | rmse={:.4} | bic={:.3} | changepoints={}",
                    report.rows_read,
                    report.rows_used,
                    report.rows_dropped(),
                    quality.rmse,
                    quality.bic,
                    data.forecast.model.changepoints.len()
                ),
                Style::default().fg(Color::Gray),
            )));
        }

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_horizon(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let unit = self.config.frequency().unit_label();
        let (ratio, label) = if self.range.is_fixed() {
            (1.0, format!("{} {unit} (fixed)", self.horizon.steps()))
        } else {
            let span = (self.range.max - self.range.min) as f64;
            (
                (self.horizon.steps() - self.range.min) as f64 / span,
                format!("{} {unit} [{}..{}]", self.horizon.steps(), self.range.min, self.range.max),
            )
        };
        let gauge = Gauge::default()
            .block(Block::default().title("Horizon").borders(Borders::ALL))
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio(ratio.clamp(0.0, 1.0))
            .label(label);
        frame.render_widget(gauge, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        if let Some(err) = &self.error {
            let p = Paragraph::new(format!("{err}"))
                .style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
                .wrap(Wrap { trim: true })
                .block(Block::default().title("Error").borders(Borders::ALL));
            frame.render_widget(p, area);
            return;
        }

        if self.show_table {
            let chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(area);
            self.draw_chart(frame, chunks[0]);
            self.draw_table(frame, chunks[1]);
        } else {
            self.draw_chart(frame, area);
        }
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title("History + forecast").borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let Some(data) = &self.data else {
            let msg = Paragraph::new("Waiting for data...").style(Style::default().fg(Color::Yellow));
            frame.render_widget(msg, inner);
            return;
        };

        let series = ChartSeries::from_data(data);
        let widget = ForecastPlottersChart {
            history: &series.history,
            fitted: &series.fitted,
            forecast: &series.forecast,
            lower: &series.lower,
            upper: &series.upper,
            x_bounds: series.x_bounds,
            y_bounds: series.y_bounds,
            x_label: "ds",
            y_label: self.config.value_col.clone(),
            fmt_x: fmt_axis_date,
            fmt_y: fmt_axis_y,
        };
        frame.render_widget(widget, inner);
    }

    fn draw_table(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let Some(data) = &self.data else {
            return;
        };
        let rows = data.forecast.future_rows();
        let visible = area.height.saturating_sub(3) as usize;
        let start = self.table_scroll.min(rows.len().saturating_sub(visible.max(1)));

        let body = rows.iter().skip(start).take(visible).map(|r| {
            Row::new(vec![
                fmt_ds(r.ds),
                format!("{:.3}", r.yhat),
                format!("{:.3}", r.yhat_lower),
                format!("{:.3}", r.yhat_upper),
            ])
        });
        let table = Table::new(
            body,
            [
                Constraint::Length(19),
                Constraint::Min(8),
                Constraint::Min(8),
                Constraint::Min(8),
            ],
        )
        .header(
            Row::new(vec!["ds", "yhat", "yhat_lower", "yhat_upper"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(
            Block::default()
                .title(format!("Forecast rows {}-{} of {}", start + 1, (start + visible).min(rows.len()), rows.len()))
                .borders(Borders::ALL),
        );
        frame.render_widget(table, area);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "←/→ horizon  PgUp/PgDn ±30  t table  ↑/↓ scroll  r refresh  e export  d debug  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// Chart series for Plotters (x = days since epoch).
struct ChartSeries {
    history: Vec<(f64, f64)>,
    fitted: Vec<(f64, f64)>,
    forecast: Vec<(f64, f64)>,
    lower: Vec<(f64, f64)>,
    upper: Vec<(f64, f64)>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

impl ChartSeries {
    fn from_data(data: &PresentationData) -> Self {
        let history: Vec<(f64, f64)> = data.history.points().iter().map(|p| (epoch_days(p.ds), p.y)).collect();
        let fitted = data
            .forecast
            .history_rows()
            .iter()
            .map(|r| (epoch_days(r.ds), r.yhat))
            .collect();

        // Join the forecast line to the last fitted point.
        let future = data.forecast.future_rows();
        let joint = data.forecast.history_rows().iter().max_by(|a, b| a.ds.cmp(&b.ds));
        let forecast = joint
            .into_iter()
            .chain(future.iter())
            .map(|r| (epoch_days(r.ds), r.yhat))
            .collect();
        let lower = future.iter().map(|r| (epoch_days(r.ds), r.yhat_lower)).collect();
        let upper = future.iter().map(|r| (epoch_days(r.ds), r.yhat_upper)).collect();

        let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for &(x, y) in &history {
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
        for r in &data.forecast.rows {
            let x = epoch_days(r.ds);
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(r.yhat_lower);
            y_max = y_max.max(r.yhat_upper);
        }

        if !x_min.is_finite() || !x_max.is_finite() || x_max <= x_min {
            x_min = 0.0;
            x_max = 1.0;
        }
        if !y_min.is_finite() || !y_max.is_finite() || y_max <= y_min {
            y_min = 0.0;
            y_max = 1.0;
        }
        let pad = ((y_max - y_min).abs() * 0.05).max(1e-12);

        Self {
            history,
            fitted,
            forecast,
            lower,
            upper,
            x_bounds: [x_min, x_max],
            y_bounds: [y_min - pad, y_max + pad],
        }
    }
}

fn fmt_axis_date(v: f64) -> String {
    chrono::DateTime::from_timestamp((v * 86_400.0).round() as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn fmt_axis_y(v: f64) -> String {
    format!("{v:.1}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::testing::MemoryStore;
    use crate::domain::RawValue;
    use crate::report::tests::sample_presentation;

    fn app_with(store: MemoryStore) -> App {
        let config = RunConfig::default();
        let horizon = Horizon::default_for(config.horizon_range());
        App::new(config, Box::new(store), horizon)
    }

    fn rows(n: i64) -> Vec<Vec<RawValue>> {
        let start = chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                vec![
                    RawValue::text((start + chrono::Duration::days(i)).to_string()),
                    RawValue::Number(5.0 + i as f64 * 0.1 + ((i * 3) % 5) as f64 * 0.2),
                ]
            })
            .collect()
    }

    #[test]
    fn chart_series_cover_history_and_future() {
        let data = sample_presentation();
        let s = ChartSeries::from_data(&data);
        assert_eq!(s.history.len(), 40);
        assert_eq!(s.fitted.len(), 40);
        assert_eq!(s.forecast.len(), 31);
        assert_eq!(s.lower.len(), 30);
        assert!(s.x_bounds[0] < s.x_bounds[1]);
        assert!(s.y_bounds[0] < s.y_bounds[1]);
    }

    #[test]
    fn axis_dates_format_epoch_days() {
        assert_eq!(fmt_axis_date(0.0), "1970-01-01");
        assert_eq!(fmt_axis_date(19_358.0), "2023-01-01");
    }

    #[test]
    fn horizon_keys_refit_from_memoized_rows() {
        let store = MemoryStore::with_rows(&["ds", "y"], rows(60));
        let opened = store.opened.clone();
        let mut app = app_with(store);

        app.refresh();
        assert_eq!(app.data.as_ref().unwrap().forecast.future_rows().len(), 90);

        app.handle_key(KeyCode::Right);
        app.handle_key(KeyCode::PageUp);
        assert_eq!(app.horizon.steps(), 121);
        assert_eq!(app.data.as_ref().unwrap().forecast.future_rows().len(), 121);

        app.handle_key(KeyCode::PageDown);
        app.handle_key(KeyCode::PageDown);
        app.handle_key(KeyCode::PageDown);
        app.handle_key(KeyCode::PageDown);
        assert_eq!(app.horizon.steps(), 30);

        // Only the explicit refresh touched the store.
        assert_eq!(opened.get(), 1);
    }

    #[test]
    fn failed_run_shows_error_and_no_data() {
        let mut app = app_with(MemoryStore::with_rows(&["ds", "y"], Vec::new()));
        app.refresh();

        assert!(app.data.is_none());
        assert!(matches!(app.error, Some(PipelineError::EmptySeries { .. })));
        assert!(matches!(app.stage, Stage::Failed(_)));
        assert!(app.status.contains("normalizing"));
    }

    #[test]
    fn quit_and_toggle_keys() {
        let mut app = app_with(MemoryStore::with_rows(&["ds", "y"], rows(20)));
        assert!(!app.handle_key(KeyCode::Char('t')));
        assert!(app.show_table);
        assert!(app.handle_key(KeyCode::Char('q')));
    }
}
