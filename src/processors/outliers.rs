//! Z-score outlier detection.

use crate::config::OutlierConfig;
use crate::core::transforms::{mean, std_dev};

/// Relative size below which a standard deviation is treated as zero.
const MIN_RELATIVE_STD: f64 = 1e-12;

/// Positions of samples whose |z-score| exceeds `threshold`.
///
/// The z-score uses the series' own mean and sample standard deviation
/// (n - 1), both computed over the non-NaN samples; NaN samples are never
/// flagged. Positions are returned in ascending order.
///
/// A series with fewer than two non-NaN samples, or with a standard
/// deviation that is zero or negligible next to its mean, has no outliers.
///
/// # Example
///
/// ```
/// use magnetometry_pipeline::processors::outliers::find_outliers;
///
/// assert_eq!(find_outliers(&[1.0, 1.0, 1.0, 1.0, 100.0], 1.0), vec![4]);
/// assert!(find_outliers(&[5.0, 5.0, 5.0, 5.0], 1.0).is_empty());
/// ```
pub fn find_outliers(series: &[f64], threshold: f64) -> Vec<usize> {
    let (Some(mu), Some(sigma)) = (mean(series), std_dev(series, 1)) else {
        return Vec::new();
    };
    if !sigma.is_finite() || sigma == 0.0 || sigma <= MIN_RELATIVE_STD * mu.abs() {
        return Vec::new();
    }

    series
        .iter()
        .enumerate()
        .filter(|(_, &v)| ((v - mu) / sigma).abs() > threshold)
        .map(|(i, _)| i)
        .collect()
}

/// [`find_outliers`] with the configured threshold.
pub fn find_outliers_with(series: &[f64], config: &OutlierConfig) -> Vec<usize> {
    find_outliers(series, config.threshold)
}
