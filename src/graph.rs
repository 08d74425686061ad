#![cfg(feature = "web")]
//! PNG rendering of chart-ready tables with `plotters`.

use crate::error::{Error, Result};
use crate::iris::ScatterSeries;
use crate::pivot::{ChartData, SeriesTable, SliceTable};
use chrono::{Duration, NaiveDate};
use plotters::coord::Shift;
use plotters::element::Pie;
use plotters::prelude::*;

type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Configuration options for graph generation
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Title displayed at the top of the graph
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Width of the graph in pixels
    pub width: u32,
    /// Height of the graph in pixels
    pub height: u32,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            title: "Graph".to_string(),
            x_label: "Date".to_string(),
            y_label: "Value".to_string(),
            width: 800,
            height: 600,
        }
    }
}

impl GraphOptions {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Renders an output as PNG: series tables as one line per column over a
/// date axis, slice tables as a pie.
pub fn render(data: &ChartData, options: &GraphOptions) -> Result<Vec<u8>> {
    match data {
        ChartData::Series(table) => draw_png(options, |root| draw_series(root, table, options)),
        ChartData::Slices(table) => draw_png(options, |root| draw_slices(root, table, options)),
    }
}

/// Renders scatter points, one colour per flower, marker radius following
/// the size feature.
pub fn render_scatter(series: &[ScatterSeries], options: &GraphOptions) -> Result<Vec<u8>> {
    draw_png(options, |root| draw_scatter(root, series, options))
}

// Plotters writes PNGs through a path, so each chart goes through a temp file.
fn draw_png<F>(options: &GraphOptions, draw: F) -> Result<Vec<u8>>
where
    F: FnOnce(&DrawingArea<BitMapBackend<'_>, Shift>) -> DrawResult,
{
    let file = tempfile::Builder::new().suffix(".png").tempfile()?;
    {
        let root = BitMapBackend::new(file.path(), (options.width, options.height)).into_drawing_area();
        root.fill(&WHITE)
            .map_err(|e| Error::Render(e.to_string()))?;
        draw(&root).map_err(|e| Error::Render(e.to_string()))?;
        root.present().map_err(|e| Error::Render(e.to_string()))?;
    }
    Ok(std::fs::read(file.path())?)
}

fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(1e-9);
    (lo - pad, hi + pad)
}

fn draw_series(root: &DrawingArea<BitMapBackend<'_>, Shift>, table: &SeriesTable, options: &GraphOptions) -> DrawResult {
    let start = table
        .rows
        .first()
        .map(|row| row.date)
        .unwrap_or(NaiveDate::MIN);
    let days = |date: NaiveDate| (date - start).num_days() as f64;
    let span = table.rows.last().map(|row| days(row.date)).unwrap_or(0.0).max(1.0);
    let (min_y, max_y) = value_range(table.rows.iter().flat_map(|row| row.values.iter().flatten().copied()));

    let mut chart = ChartBuilder::on(root)
        .caption(&options.title, ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..span, min_y..max_y)?;

    let date_label = |x: &f64| (start + Duration::days(x.round() as i64)).format("%Y-%m-%d").to_string();
    chart
        .configure_mesh()
        .x_desc(&options.x_label)
        .y_desc(&options.y_label)
        .x_label_formatter(&date_label)
        .draw()?;

    for (index, column) in table.columns.iter().enumerate() {
        let color = Palette99::pick(index).to_rgba();
        chart
            .draw_series(LineSeries::new(
                table
                    .series(column)
                    .into_iter()
                    .map(|(date, value)| (days(date), value)),
                color.stroke_width(2),
            ))?
            .label(column.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    if !table.columns.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    Ok(())
}

fn draw_slices(root: &DrawingArea<BitMapBackend<'_>, Shift>, table: &SliceTable, options: &GraphOptions) -> DrawResult {
    let area = root.titled(&options.title, ("sans-serif", 30).into_font())?;
    // Pie wedges cannot be negative; corrections show as an empty wedge.
    let sizes: Vec<f64> = table.slices.iter().map(|s| s.value.max(0.0)).collect();
    if sizes.iter().sum::<f64>() <= 0.0 {
        return Ok(());
    }
    let colors: Vec<RGBColor> = (0..sizes.len())
        .map(|i| {
            let c = Palette99::pick(i).to_rgba();
            RGBColor(c.0, c.1, c.2)
        })
        .collect();
    let labels = table.labels();

    let (w, h) = area.dim_in_pixel();
    let center = (w as i32 / 2, h as i32 / 2);
    let radius = f64::from(w.min(h)) * 0.35;
    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.label_style(("sans-serif", 16).into_font().color(&BLACK));
    pie.percentages(("sans-serif", radius * 0.08).into_font().color(&BLACK));
    area.draw(&pie)?;
    Ok(())
}

fn draw_scatter(root: &DrawingArea<BitMapBackend<'_>, Shift>, series: &[ScatterSeries], options: &GraphOptions) -> DrawResult {
    let points = || series.iter().flat_map(|s| s.points.iter());
    let (min_x, max_x) = value_range(points().map(|p| p.x));
    let (min_y, max_y) = value_range(points().map(|p| p.y));
    let max_size = points().map(|p| p.size).fold(0.0, f64::max).max(1e-9);

    let mut chart = ChartBuilder::on(root)
        .caption(&options.title, ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(min_x..max_x, min_y..max_y)?;

    chart
        .configure_mesh()
        .x_desc(&options.x_label)
        .y_desc(&options.y_label)
        .draw()?;

    for (index, flower) in series.iter().enumerate() {
        let color = Palette99::pick(index).to_rgba();
        chart
            .draw_series(flower.points.iter().map(|p| {
                let radius = 2 + (p.size / max_size * 8.0).round() as i32;
                Circle::new((p.x, p.y), radius, color.filled())
            }))?
            .label(flower.flower.as_str())
            .legend(move |(x, y)| Circle::new((x + 10, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}
