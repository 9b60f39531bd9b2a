//! Plotters-powered forecast chart widget for Ratatui.
//!
//! We render Plotters output into the Ratatui buffer using `plotters-ratatui-backend`.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

/// A lightweight, render-only chart description.
///
/// All series and bounds are computed outside the render call. X values are
/// days since the Unix epoch.
pub struct ForecastPlottersChart<'a> {
    /// Observed history (scatter).
    pub history: &'a [(f64, f64)],
    /// Model prediction over the history.
    pub fitted: &'a [(f64, f64)],
    /// Model prediction over the forecast steps.
    pub forecast: &'a [(f64, f64)],
    /// Interval bounds over the forecast steps.
    pub lower: &'a [(f64, f64)],
    pub upper: &'a [(f64, f64)],
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    pub x_label: &'a str,
    pub y_label: String,
    pub fmt_x: fn(f64) -> String,
    pub fmt_y: fn(f64) -> String,
}

impl<'a> Widget for ForecastPlottersChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Plotters may fail to build a chart in tiny areas; show a hint instead.
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let x0 = self.x_bounds[0];
        let x1 = self.x_bounds[1];
        let y0 = self.y_bounds[0];
        let y1 = self.y_bounds[1];

        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                // Terminal cells are low-res, so keep label areas compact.
                .set_label_area_size(LabelAreaPosition::Left, 6)
                .set_label_area_size(LabelAreaPosition::Bottom, 3)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_desc(self.x_label)
                .y_desc(&self.y_label)
                .x_labels(5)
                .y_labels(5)
                .x_label_formatter(&|v| (self.fmt_x)(*v))
                .y_label_formatter(&|v| (self.fmt_y)(*v))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            let fitted_color = RGBColor(0, 160, 160);
            let forecast_color = RGBColor(0, 255, 255); // cyan
            let band_color = RGBColor(255, 200, 0); // amber
            let history_color = WHITE;

            chart.draw_series(LineSeries::new(self.upper.iter().copied(), &band_color))?;
            chart.draw_series(LineSeries::new(self.lower.iter().copied(), &band_color))?;
            chart.draw_series(LineSeries::new(self.fitted.iter().copied(), &fitted_color))?;
            chart.draw_series(LineSeries::new(self.forecast.iter().copied(), &forecast_color))?;

            // `Pixel` rather than `Circle`: the backend maps circle radii to
            // canvas units incorrectly, producing huge markers.
            chart.draw_series(
                self.history
                    .iter()
                    .map(|&(x, y)| Pixel::new((x, y), history_color)),
            )?;

            Ok(())
        });

        widget.render(area, buf);
    }
}
