//! Static Chart Renderer
//! Draws bar charts to PNG files with plotters.
//!
//! Layouts:
//! 1. Single bar chart, linear or logarithmic y axis
//! 2. Stacked panels, one bar chart per row

use crate::stats::FrequencyTable;
use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::FontTransform;
use std::path::Path;
use thiserror::Error;

// Bar colors
pub const SKY_BLUE: RGBColor = RGBColor(135, 206, 235);
pub const LIGHT_GREEN: RGBColor = RGBColor(144, 238, 144);
pub const SALMON: RGBColor = RGBColor(250, 128, 114);
const GRID: RGBColor = RGBColor(200, 200, 200); // Horizontal grid lines

/// Longer category names are cut to this many characters on the x axis.
const MAX_LABEL_CHARS: usize = 32;

/// Log-axis baseline, log10(0.5): a count of 1 still gets a visible bar.
const LOG_BASELINE: f64 = -0.301_029_995_663_981_2;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Failed to draw chart: {0}")]
    Render(String),
    #[error("Nothing to plot for '{0}'")]
    Empty(String),
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for ChartError {
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        ChartError::Render(err.to_string())
    }
}

/// One bar per category.
#[derive(Debug, Clone)]
pub struct BarChart {
    pub title: String,
    pub x_desc: String,
    pub y_desc: String,
    pub labels: Vec<String>,
    pub values: Vec<u64>,
    pub color: RGBColor,
    pub log_scale: bool,
    pub rotate_labels: bool,
}

impl BarChart {
    pub fn from_table(
        title: impl Into<String>,
        x_desc: impl Into<String>,
        y_desc: impl Into<String>,
        table: &FrequencyTable,
        color: RGBColor,
    ) -> Self {
        Self {
            title: title.into(),
            x_desc: x_desc.into(),
            y_desc: y_desc.into(),
            labels: table.labels(),
            values: table.counts(),
            color,
            log_scale: false,
            rotate_labels: false,
        }
    }

    pub fn log_scale(mut self) -> Self {
        self.log_scale = true;
        self
    }

    pub fn rotate_labels(mut self) -> Self {
        self.rotate_labels = true;
        self
    }

    /// Bottom of the y axis in axis units.
    fn baseline(&self) -> f64 {
        if self.log_scale {
            LOG_BASELINE
        } else {
            0.0
        }
    }

    /// Bar height in axis units; on a log axis that is `log10(count)`.
    fn bar_height(&self, value: u64) -> f64 {
        if !self.log_scale {
            value as f64
        } else if value == 0 {
            LOG_BASELINE
        } else {
            (value as f64).log10()
        }
    }
}

/// Y tick text: decades only (1, 10, 100, ...) on a log axis.
fn y_tick_label(log_scale: bool, value: f64) -> String {
    if !log_scale {
        return format!("{:.0}", value);
    }
    let decade = value.round();
    if decade >= 0.0 && (value - decade).abs() < 1e-6 {
        format!("{:.0}", 10f64.powf(decade))
    } else {
        String::new()
    }
}

/// Cut `label` to at most `max` characters, marking the cut with an ellipsis.
pub fn shorten_label(label: &str, max: usize) -> String {
    if label.chars().count() <= max {
        return label.to_string();
    }
    let mut short: String = label.chars().take(max.saturating_sub(1)).collect();
    short.push('…');
    short
}

pub struct StaticChartRenderer;

impl StaticChartRenderer {
    /// Render a single bar chart to `path`.
    pub fn render_bar_chart(path: &Path, chart: &BarChart, size: (u32, u32)) -> Result<(), ChartError> {
        let root = BitMapBackend::new(path, size).into_drawing_area();
        root.fill(&WHITE)?;

        Self::draw_bar_panel(&root, chart)?;

        root.present()?;
        Ok(())
    }

    /// Render charts stacked vertically, one panel each, to `path`.
    pub fn render_panels(path: &Path, charts: &[BarChart], size: (u32, u32)) -> Result<(), ChartError> {
        let root = BitMapBackend::new(path, size).into_drawing_area();
        root.fill(&WHITE)?;

        let panels = root.split_evenly((charts.len().max(1), 1));
        for (panel, chart) in panels.iter().zip(charts) {
            Self::draw_bar_panel(panel, chart)?;
        }

        root.present()?;
        Ok(())
    }

    fn draw_bar_panel(area: &DrawingArea<BitMapBackend<'_>, Shift>, chart: &BarChart) -> Result<(), ChartError> {
        if chart.values.is_empty() {
            return Err(ChartError::Empty(chart.title.clone()));
        }

        let n = chart.values.len();
        let heights: Vec<f64> = chart.values.iter().map(|&v| chart.bar_height(v)).collect();
        let bottom = chart.baseline();
        let top = heights.iter().copied().fold(0.0, f64::max);
        let y_max = if chart.log_scale {
            top + 0.5
        } else {
            (top * 1.1).max(1.0)
        };

        let labels: Vec<String> = chart
            .labels
            .iter()
            .map(|label| shorten_label(label, MAX_LABEL_CHARS))
            .collect();
        let x_label_area = if chart.rotate_labels { 180 } else { 45 };

        let label_font = ("sans-serif", 13).into_font();
        let label_font = if chart.rotate_labels {
            label_font.transform(FontTransform::Rotate90)
        } else {
            label_font
        };

        let mut ctx = ChartBuilder::on(area)
            .caption(&chart.title, ("sans-serif", 22))
            .margin(15)
            .x_label_area_size(x_label_area)
            .y_label_area_size(70)
            .build_cartesian_2d((0..n).into_segmented(), bottom..y_max)?;

        let x_formatter = |value: &SegmentValue<usize>| match value {
            SegmentValue::CenterOf(idx) => labels.get(*idx).cloned().unwrap_or_default(),
            _ => String::new(),
        };
        let log_scale = chart.log_scale;
        let y_formatter = |value: &f64| y_tick_label(log_scale, *value);

        ctx.configure_mesh()
            .disable_x_mesh()
            .bold_line_style(GRID.mix(0.7))
            .light_line_style(WHITE)
            .x_labels(n)
            .x_label_formatter(&x_formatter)
            .y_label_formatter(&y_formatter)
            .x_label_style(label_font)
            .x_desc(chart.x_desc.as_str())
            .y_desc(chart.y_desc.as_str())
            .draw()?;

        ctx.draw_series(heights.iter().enumerate().map(|(idx, &height)| {
            let mut bar = Rectangle::new(
                [
                    (SegmentValue::Exact(idx), bottom),
                    (SegmentValue::Exact(idx + 1), height),
                ],
                chart.color.filled(),
            );
            bar.set_margin(0, 0, 6, 6);
            bar
        }))?;

        Ok(())
    }
}
