//! Visualization of magnetometry curves.
//!
//! Renders moment against temperature as a PNG scatter plot using the
//! plotters library. When a turnaround is given, the ZFC and FC segments
//! are drawn in different colours.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::core::loaders::LoaderError;
use crate::core::transforms::MagneticTable;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("No finite (temperature, moment) pairs to plot")]
    EmptyTable,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1280;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 960;

/// ZFC segment colour (blue).
const ZFC_COLOR: RGBColor = RGBColor(55, 126, 184);

/// FC segment colour (red).
const FC_COLOR: RGBColor = RGBColor(228, 26, 28);

/// Plot moment vs temperature and save as PNG.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `table` - Canonical table; must carry a moment column
/// * `turnaround` - Index of the first FC sample, if known
/// * `max_points` - Maximum number of points to plot (subsamples if exceeded)
///
/// # Errors
///
/// Returns an error if the table has no moment column, no finite points, or
/// the image cannot be drawn.
pub fn plot_moment_vs_temperature(
    output_path: &Path,
    table: &MagneticTable,
    turnaround: Option<usize>,
    max_points: usize,
) -> Result<()> {
    let (moment, _) = table.require_moment()?;

    let n = table.len();
    let step = if n > max_points { n / max_points.max(1) } else { 1 };

    let points: Vec<(f64, f64, RGBColor)> = (0..n)
        .step_by(step)
        .filter(|&i| table.temp[i].is_finite() && moment[i].is_finite())
        .map(|i| {
            let color = match turnaround {
                Some(t) if i >= t => FC_COLOR,
                _ => ZFC_COLOR,
            };
            (table.temp[i], moment[i], color)
        })
        .collect();

    if points.is_empty() {
        return Err(VisualizationError::EmptyTable);
    }

    let (x_min, x_max, y_min, y_max) = compute_bounds(&points);
    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT))
        .into_drawing_area();

    root.fill(&WHITE).map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(
            points
                .iter()
                .map(|(x, y, color)| Circle::new((*x, *y), 3, color.filled())),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present().map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

/// Compute the bounds (min/max) for x and y coordinates.
fn compute_bounds(points: &[(f64, f64, RGBColor)]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::MAX;
    let mut x_max = f64::MIN;
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;

    for (x, y, _) in points {
        x_min = x_min.min(*x);
        x_max = x_max.max(*x);
        y_min = y_min.min(*y);
        y_max = y_max.max(*y);
    }

    // Flat axes get a span relative to their magnitude (moments are ~1e-5 emu)
    if x_max - x_min <= f64::EPSILON * x_max.abs().max(1.0) {
        let pad = x_max.abs().max(1.0) * 0.01;
        x_min -= pad;
        x_max += pad;
    }
    if y_max - y_min <= f64::EPSILON * y_max.abs() {
        let pad = if y_max == 0.0 { 1.0 } else { y_max.abs() * 0.01 };
        y_min -= pad;
        y_max += pad;
    }

    (x_min, x_max, y_min, y_max)
}
