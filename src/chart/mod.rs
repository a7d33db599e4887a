//! Line chart of memory samples
//!
//! Draws the four memory datasets of a [`ChartSeries`] onto an RGB canvas
//! with `imageproc`. Text (title, axis labels, ticks and legend names) needs
//! a TrueType font; without one the chart is drawn without text.

use std::path::Path;
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use tracing::{debug, info};

use crate::config::ChartConfig;
use crate::error::{Result, ProbeError};
use crate::samples::ChartSeries;

const MARGIN_LEFT: u32 = 70;
const MARGIN_RIGHT: u32 = 25;
const MARGIN_TOP: u32 = 70;
const MARGIN_BOTTOM: u32 = 70;
const POINT_RADIUS: i32 = 3;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const TEXT: Rgb<u8> = Rgb([60, 60, 60]);

/// Line colours, one per dataset in [`ChartSeries::datasets`] order
pub const SERIES_COLORS: [Rgb<u8>; 4] = [
    Rgb([255, 0, 0]),   // RSS: red
    Rgb([0, 0, 255]),   // Heap total: blue
    Rgb([0, 128, 0]),   // Heap used: green
    Rgb([255, 165, 0]), // External: orange
];

/// Renders memory charts with a fixed layout
pub struct ChartRenderer {
    config: ChartConfig,
    font: Option<Font<'static>>,
}

impl ChartRenderer {
    /// Create a renderer, loading the configured font if any
    pub fn new(config: ChartConfig) -> Result<Self> {
        let font = match &config.font {
            Some(path) => Some(load_font(path)?),
            None => None,
        };

        Ok(Self { config, font })
    }

    /// Draw the chart
    pub fn render(&self, series: &ChartSeries) -> Result<RgbImage> {
        validate_series(series)?;

        let width = self.config.width;
        let height = self.config.height;
        if width <= MARGIN_LEFT + MARGIN_RIGHT || height <= MARGIN_TOP + MARGIN_BOTTOM {
            return Err(ProbeError::chart(format!("Canvas {}x{} is too small", width, height)));
        }

        let mut canvas = RgbImage::from_pixel(width, height, WHITE);
        let plot = PlotArea {
            left: MARGIN_LEFT as f32,
            right: (width - MARGIN_RIGHT) as f32,
            top: MARGIN_TOP as f32,
            bottom: (height - MARGIN_BOTTOM) as f32,
        };
        let (axis_max, step) = nice_axis(series.max_value());

        self.draw_grid(&mut canvas, &plot, axis_max, step);
        self.draw_x_labels(&mut canvas, &plot, series);

        for ((_, values), color) in series.datasets().iter().zip(SERIES_COLORS) {
            draw_dataset(&mut canvas, &plot, values, axis_max, color);
        }

        self.draw_legend(&mut canvas, series);
        self.draw_titles(&mut canvas, &plot);

        debug!("Rendered chart with {} points (y max {:.1} MB)", series.len(), axis_max);
        Ok(canvas)
    }

    /// Draw the chart and save it as PNG
    pub fn write<P: AsRef<Path>>(&self, series: &ChartSeries, path: P) -> Result<()> {
        let path = path.as_ref();
        let canvas = self.render(series)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        canvas.save_with_format(path, image::ImageFormat::Png)?;

        info!("Chart written to {:?}", path);
        Ok(())
    }

    fn draw_grid(&self, canvas: &mut RgbImage, plot: &PlotArea, axis_max: f64, step: f64) {
        let ticks = (axis_max / step).round() as u32;
        for tick in 0..=ticks {
            let value = step * f64::from(tick);
            let y = plot.y_for(value, axis_max);
            draw_line_segment_mut(canvas, (plot.left, y), (plot.right, y), GRID);

            if let Some(font) = &self.font {
                let label = format_tick(value, step);
                let scale = Scale::uniform(13.0);
                let (text_width, text_height) = text_size(scale, font, &label);
                draw_text_mut(
                    canvas,
                    TEXT,
                    plot.left as i32 - text_width - 8,
                    y as i32 - text_height / 2,
                    scale,
                    font,
                    &label,
                );
            }
        }

        // Axes
        draw_line_segment_mut(canvas, (plot.left, plot.top), (plot.left, plot.bottom), BLACK);
        draw_line_segment_mut(canvas, (plot.left, plot.bottom), (plot.right, plot.bottom), BLACK);
    }

    fn draw_x_labels(&self, canvas: &mut RgbImage, plot: &PlotArea, series: &ChartSeries) {
        let count = series.len();
        for index in 0..count {
            let x = plot.x_for(index, count);
            draw_line_segment_mut(canvas, (x, plot.bottom), (x, plot.bottom + 5.0), BLACK);
        }

        let Some(font) = &self.font else {
            return;
        };

        let scale = Scale::uniform(12.0);
        let widest = series
            .labels
            .iter()
            .map(|label| text_size(scale, font, label).0)
            .max()
            .unwrap_or(0)
            .max(1);
        let every = label_stride(count, widest as f32 + 6.0, plot.width());

        for (index, label) in series.labels.iter().enumerate().step_by(every) {
            let x = plot.x_for(index, count);
            let (text_width, _) = text_size(scale, font, label);
            draw_text_mut(
                canvas,
                TEXT,
                x as i32 - text_width / 2,
                plot.bottom as i32 + 9,
                scale,
                font,
                label,
            );
        }
    }

    fn draw_legend(&self, canvas: &mut RgbImage, series: &ChartSeries) {
        let scale = Scale::uniform(13.0);
        let mut x = MARGIN_LEFT as i32;
        let y = MARGIN_TOP as i32 - 28;

        for ((name, _), color) in series.datasets().iter().zip(SERIES_COLORS) {
            draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(30, 10), color);
            draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(30, 10), BLACK);
            x += 36;

            if let Some(font) = &self.font {
                let (text_width, _) = text_size(scale, font, name);
                draw_text_mut(canvas, TEXT, x, y - 2, scale, font, name);
                x += text_width + 18;
            } else {
                x += 12;
            }
        }
    }

    fn draw_titles(&self, canvas: &mut RgbImage, plot: &PlotArea) {
        let Some(font) = &self.font else {
            return;
        };

        let title_scale = Scale::uniform(20.0);
        let (title_width, _) = text_size(title_scale, font, &self.config.title);
        draw_text_mut(
            canvas,
            BLACK,
            (self.config.width as i32 - title_width) / 2,
            10,
            title_scale,
            font,
            &self.config.title,
        );

        let label_scale = Scale::uniform(14.0);
        let (x_label_width, _) = text_size(label_scale, font, &self.config.x_label);
        draw_text_mut(
            canvas,
            TEXT,
            (plot.left + plot.width() / 2.0) as i32 - x_label_width / 2,
            self.config.height as i32 - 28,
            label_scale,
            font,
            &self.config.x_label,
        );

        // No rotated text, so the y-axis title sits above the axis
        draw_text_mut(
            canvas,
            TEXT,
            8,
            plot.top as i32 - 14,
            label_scale,
            font,
            &self.config.y_label,
        );
    }
}

/// Render `series` with `config`
pub fn render(series: &ChartSeries, config: &ChartConfig) -> Result<RgbImage> {
    ChartRenderer::new(config.clone())?.render(series)
}

/// Render `series` with `config` and save it as PNG at `path`
pub fn write_chart<P: AsRef<Path>>(series: &ChartSeries, config: &ChartConfig, path: P) -> Result<()> {
    ChartRenderer::new(config.clone())?.write(series, path)
}

/// Pixel geometry of the plotting rectangle
struct PlotArea {
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
}

impl PlotArea {
    fn width(&self) -> f32 {
        self.right - self.left
    }

    fn height(&self) -> f32 {
        self.bottom - self.top
    }

    fn x_for(&self, index: usize, count: usize) -> f32 {
        if count <= 1 {
            return self.left + self.width() / 2.0;
        }
        self.left + self.width() * index as f32 / (count - 1) as f32
    }

    fn y_for(&self, value: f64, axis_max: f64) -> f32 {
        let fraction = (value / axis_max).clamp(0.0, 1.0) as f32;
        self.bottom - fraction * self.height()
    }
}

fn draw_dataset(canvas: &mut RgbImage, plot: &PlotArea, values: &[f64], axis_max: f64, color: Rgb<u8>) {
    let count = values.len();
    let points: Vec<Option<(f32, f32)>> = values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            value
                .is_finite()
                .then(|| (plot.x_for(index, count), plot.y_for(*value, axis_max)))
        })
        .collect();

    for pair in points.windows(2) {
        if let [Some(start), Some(end)] = pair {
            // Two pixels wide
            draw_line_segment_mut(canvas, *start, *end, color);
            draw_line_segment_mut(canvas, (start.0, start.1 + 1.0), (end.0, end.1 + 1.0), color);
        }
    }

    for (x, y) in points.into_iter().flatten() {
        draw_filled_circle_mut(canvas, (x as i32, y as i32), POINT_RADIUS, color);
    }
}

fn validate_series(series: &ChartSeries) -> Result<()> {
    if series.is_empty() {
        return Err(ProbeError::invalid_parameters("No samples to chart"));
    }

    let count = series.len();
    for (name, values) in series.datasets() {
        if values.len() != count {
            return Err(ProbeError::invalid_parameters(format!(
                "Dataset {} has {} values for {} labels",
                name,
                values.len(),
                count
            )));
        }
    }

    Ok(())
}

fn load_font(path: &Path) -> Result<Font<'static>> {
    let bytes = std::fs::read(path)
        .map_err(|e| ProbeError::chart(format!("Failed to read font {:?}: {}", path, e)))?;
    Font::try_from_vec(bytes)
        .ok_or_else(|| ProbeError::chart(format!("Not a usable TrueType font: {:?}", path)))
}

/// Y-axis maximum and tick step covering `max_value` with 1-2-5 steps
pub fn nice_axis(max_value: f64) -> (f64, f64) {
    if !max_value.is_finite() || max_value <= 0.0 {
        return (1.0, 0.2);
    }

    let raw_step = max_value / 5.0;
    let magnitude = 10f64.powf(raw_step.log10().floor());
    let normalized = raw_step / magnitude;
    let nice = if normalized <= 1.0 {
        1.0
    } else if normalized <= 2.0 {
        2.0
    } else if normalized <= 5.0 {
        5.0
    } else {
        10.0
    };

    let step = nice * magnitude;
    let axis_max = (max_value / step).ceil() * step;
    (axis_max, step)
}

/// Show every n-th x label so labels of `label_width` don't overlap
fn label_stride(count: usize, label_width: f32, plot_width: f32) -> usize {
    if count <= 1 || plot_width <= 0.0 {
        return 1;
    }
    let spacing = plot_width / (count - 1) as f32;
    ((label_width / spacing).ceil() as usize).max(1)
}

fn format_tick(value: f64, step: f64) -> String {
    if step >= 1.0 {
        format!("{:.0}", value)
    } else if step >= 0.1 {
        format!("{:.1}", value)
    } else {
        format!("{:.2}", value)
    }
}
