//! DBSCAN clustering of 1-D series for nominal-value extraction.
//!
//! Instrument readings that should sit on a handful of set points (a
//! temperature held at 5 K, then 10 K, ...) arrive with noise. Standardizing
//! the series and running DBSCAN groups the readings of each set point into
//! one cluster; the cluster means are the nominal values.
//!
//! In one dimension the neighbourhood of a point is a contiguous window of
//! the sorted values, so neighbour counting is a pair of binary searches per
//! point (run in parallel with `rayon`), and two core points are connected
//! exactly when consecutive core points between them are within `eps`.
//!
//! # Example
//!
//! ```
//! use magnetometry_pipeline::config::NoisePolicy;
//! use magnetometry_pipeline::processors::clustering::unique_values;
//!
//! let mut temps = vec![5.0; 20];
//! temps.extend(vec![10.0; 20]);
//! let nominal = unique_values(&temps, 0.001, 10, NoisePolicy::Include).unwrap();
//! assert_eq!(nominal, vec![5.0, 10.0]);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{ClusteringConfig, NoisePolicy};
use crate::core::transforms::standardize;

/// Label of samples that belong to no cluster.
pub const NOISE: i32 = -1;

/// Errors that can occur during clustering.
#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error("eps must be finite and positive, got {0}")]
    InvalidEps(f64),

    #[error("non-finite sample at position {0}")]
    NonFinite(usize),
}

/// Result type for clustering operations.
pub type Result<T> = std::result::Result<T, ClusteringError>;

/// Atomic Union-Find data structure for lock-free parallel cluster merging.
///
/// Uses path compression with atomic compare-and-swap operations to safely
/// merge clusters from multiple threads without locks.
pub struct AtomicUnionFind {
    parent: Vec<AtomicUsize>,
}

impl AtomicUnionFind {
    /// Create a new union-find structure where each element is its own parent.
    #[inline]
    pub fn new(size: usize) -> Self {
        let parent = (0..size).map(AtomicUsize::new).collect();
        Self { parent }
    }

    /// Find the root of the set containing `x` with path compression.
    #[inline]
    pub fn find(&self, mut x: usize) -> usize {
        loop {
            let p = self.parent[x].load(Ordering::Relaxed);
            if p == x {
                return x;
            }
            let gp = self.parent[p].load(Ordering::Relaxed);
            if gp != p {
                // Failure only means another thread compressed first
                let _ = self.parent[x].compare_exchange_weak(
                    p,
                    gp,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
            }
            x = p;
        }
    }

    /// Union the sets containing `x` and `y`.
    ///
    /// Returns true if a merge occurred, false if they were already in the
    /// same set.
    #[inline]
    pub fn union(&self, x: usize, y: usize) -> bool {
        loop {
            let root_x = self.find(x);
            let root_y = self.find(y);

            if root_x == root_y {
                return false;
            }

            // Smaller root points to the larger one
            let (small, large) = if root_x < root_y {
                (root_x, root_y)
            } else {
                (root_y, root_x)
            };

            if self.parent[small]
                .compare_exchange_weak(small, large, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }
}

/// DBSCAN over 1-D points.
///
/// Points are neighbours when `|a - b| <= eps`; a point's neighbourhood
/// includes itself. A core point has at least `min_samples` neighbours.
///
/// # Algorithm
///
/// 1. **Sort**: rank the points by value
/// 2. **Parallel neighbour windows**: for each sorted position, binary search
///    the first and one-past-last value within `eps`
/// 3. **Core points**: window length >= `min_samples`
/// 4. **Union**: consecutive core points within `eps` are merged with the
///    atomic union-find
/// 5. **Labels**: clusters are numbered `0, 1, ...` in order of their first
///    core point by input position; a non-core point within `eps` of a core
///    point joins the cluster of the nearest such core point; everything else
///    is [`NOISE`]
///
/// # Returns
///
/// One label per input point, in input order.
pub fn dbscan_1d(points: &[f64], eps: f64, min_samples: usize) -> Vec<i32> {
    let n = points.len();
    if n == 0 {
        return Vec::new();
    }

    // Phase 1: sorted order and each point's rank in it
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| points[a].total_cmp(&points[b]));
    let sorted: Vec<f64> = order.iter().map(|&i| points[i]).collect();
    let mut rank = vec![0usize; n];
    for (k, &i) in order.iter().enumerate() {
        rank[i] = k;
    }

    // Phase 2: neighbour window [lo, hi) per sorted position
    let windows: Vec<(usize, usize)> = sorted
        .par_iter()
        .map(|&v| {
            let lo = sorted.partition_point(|&u| v - u > eps);
            let hi = sorted.partition_point(|&u| u - v <= eps);
            (lo, hi)
        })
        .collect();

    // Phase 3: core points
    let is_core: Vec<bool> = windows
        .par_iter()
        .map(|&(lo, hi)| hi - lo >= min_samples)
        .collect();

    // Phase 4: merge consecutive core points that are within eps
    let core_positions: Vec<usize> = (0..n).filter(|&k| is_core[k]).collect();
    let uf = AtomicUnionFind::new(n);
    core_positions.par_windows(2).for_each(|pair| {
        if sorted[pair[1]] - sorted[pair[0]] <= eps {
            uf.union(pair[0], pair[1]);
        }
    });

    // Phase 5: label assignment
    let mut root_to_cluster: HashMap<usize, i32> = HashMap::new();
    let mut next_cluster_id: i32 = 0;
    for &k in &rank {
        if is_core[k] {
            root_to_cluster.entry(uf.find(k)).or_insert_with(|| {
                let id = next_cluster_id;
                next_cluster_id += 1;
                id
            });
        }
    }

    let label_at = |k: usize| -> i32 {
        if is_core[k] {
            return root_to_cluster[&uf.find(k)];
        }
        // Border points have a short window, so this scan is cheap
        let (lo, hi) = windows[k];
        (lo..hi)
            .filter(|&j| is_core[j])
            .min_by(|&a, &b| {
                (sorted[a] - sorted[k])
                    .abs()
                    .total_cmp(&(sorted[b] - sorted[k]).abs())
            })
            .map_or(NOISE, |j| root_to_cluster[&uf.find(j)])
    };

    let labels: Vec<i32> = rank.iter().map(|&k| label_at(k)).collect();

    debug!(
        "dbscan: {} points, {} core, {} clusters",
        n,
        core_positions.len(),
        next_cluster_id
    );

    labels
}

fn validate(series: &[f64], eps: f64) -> Result<()> {
    if !(eps.is_finite() && eps > 0.0) {
        return Err(ClusteringError::InvalidEps(eps));
    }
    match series.iter().position(|v| !v.is_finite()) {
        Some(pos) => Err(ClusteringError::NonFinite(pos)),
        None => Ok(()),
    }
}

/// Label each sample of a series containing one or more noisy nominal values.
///
/// The series is standardized to zero mean and unit variance before
/// clustering, so `eps` is in units of the series' standard deviation.
/// A series shorter than `min_samples` comes back all [`NOISE`].
///
/// # Errors
///
/// Returns an error if `eps` is not finite and positive or a sample is not
/// finite.
pub fn label_clusters(series: &[f64], eps: f64, min_samples: usize) -> Result<Vec<i32>> {
    validate(series, eps)?;
    let standardized = standardize(series);
    Ok(dbscan_1d(&standardized, eps, min_samples))
}

/// Round to `decimals` decimal places, halves to even on the scaled value.
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Number of samples per label.
pub fn label_counts(labels: &[i32]) -> BTreeMap<i32, usize> {
    let mut counts = BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Nominal values of a noisy series.
///
/// For each label in ascending order ([`NOISE`] first when present), the
/// mean of the original values carrying it, rounded to one decimal place.
/// With [`NoisePolicy::Exclude`] the noise group is left out.
///
/// # Errors
///
/// See [`label_clusters`].
pub fn unique_values(
    series: &[f64],
    eps: f64,
    min_samples: usize,
    noise: NoisePolicy,
) -> Result<Vec<f64>> {
    let labels = label_clusters(series, eps, min_samples)?;

    let mut groups: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for (&value, &label) in series.iter().zip(&labels) {
        let entry = groups.entry(label).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    Ok(groups
        .into_iter()
        .filter(|&(label, _)| label != NOISE || noise == NoisePolicy::Include)
        .map(|(_, (sum, count))| round_to(sum / count as f64, 1))
        .collect())
}

/// Nominal values of a noisy series using clustering configuration.
///
/// Convenience wrapper over [`unique_values`].
///
/// # Errors
///
/// See [`label_clusters`].
pub fn cluster_nominal_values(series: &[f64], config: &ClusteringConfig) -> Result<Vec<f64>> {
    let values = unique_values(series, config.eps, config.min_samples, config.noise)?;
    info!(
        "{} samples -> {} nominal value(s) (eps={}, min_samples={}, noise={:?})",
        series.len(),
        values.len(),
        config.eps,
        config.min_samples,
        config.noise
    );
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `count` samples within +/- `spread` of `center`, deterministic.
    fn plateau(center: f64, spread: f64, count: usize) -> Vec<f64> {
        (0..count)
            .map(|i| center + spread * ((i % 7) as f64 - 3.0) / 3.0)
            .collect()
    }

    #[test]
    fn test_atomic_union_find_basic() {
        let uf = AtomicUnionFind::new(5);

        assert_eq!(uf.find(0), 0);
        assert_eq!(uf.find(4), 4);

        assert!(uf.union(0, 1));
        assert_eq!(uf.find(0), uf.find(1));

        assert!(uf.union(2, 3));
        assert_ne!(uf.find(0), uf.find(2));

        assert!(uf.union(1, 2));
        assert_eq!(uf.find(0), uf.find(3));

        // Union of same set returns false
        assert!(!uf.union(0, 3));
    }

    #[test]
    fn test_dbscan_two_groups_numbered_by_position() {
        let points = vec![10.0, 10.1, 10.2, 0.0, 0.1, 0.2];
        let labels = dbscan_1d(&points, 0.5, 2);

        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_dbscan_border_and_noise() {
        // 1.9 has only two neighbours but sits within eps of core point 1.0
        let points = vec![0.0, 0.5, 1.0, 1.9, 10.0];
        let labels = dbscan_1d(&points, 1.0, 3);

        assert_eq!(labels, vec![0, 0, 0, 0, NOISE]);
    }

    #[test]
    fn test_dbscan_gap_splits_clusters() {
        // Two dense runs 1.5 apart with eps 1.0 must not merge
        let points = vec![0.0, 0.1, 0.2, 1.7, 1.8, 1.9];
        let labels = dbscan_1d(&points, 1.0, 3);

        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_dbscan_min_samples_one() {
        let labels = dbscan_1d(&[0.0, 5.0, 10.0, 5.5], 1.0, 1);
        assert_eq!(labels, vec![0, 1, 2, 1]);
    }

    #[test]
    fn test_dbscan_empty_and_single() {
        assert!(dbscan_1d(&[], 1.0, 3).is_empty());
        assert_eq!(dbscan_1d(&[1.0], 1.0, 2), vec![NOISE]);
    }

    #[test]
    fn test_unique_values_two_plateaus() {
        let mut series = plateau(5.0, 0.0001, 100);
        series.extend(plateau(10.0, 0.0001, 100));

        let labels = label_clusters(&series, 0.001, 10).unwrap();
        assert!(labels[..100].iter().all(|&l| l == 0));
        assert!(labels[100..].iter().all(|&l| l == 1));

        let values = unique_values(&series, 0.001, 10, NoisePolicy::Include).unwrap();
        assert_eq!(values, vec![5.0, 10.0]);
    }

    #[test]
    fn test_too_few_samples_is_all_noise() {
        let series = plateau(5.0, 0.0001, 5);

        let labels = label_clusters(&series, 0.001, 10).unwrap();
        assert_eq!(labels, vec![NOISE; 5]);

        let included = unique_values(&series, 0.001, 10, NoisePolicy::Include).unwrap();
        assert_eq!(included, vec![5.0]);

        let excluded = unique_values(&series, 0.001, 10, NoisePolicy::Exclude).unwrap();
        assert!(excluded.is_empty());
    }

    #[test]
    fn test_wide_noise_single_nominal_value() {
        // Spread is wide relative to eps: every sample is noise, and only
        // the Include policy recovers the set point.
        let series: Vec<f64> = (0..30).map(|i| 20.0 + (i as f64 / 29.0 - 0.5)).collect();

        let labels = label_clusters(&series, 0.001, 10).unwrap();
        assert!(labels.iter().all(|&l| l == NOISE));

        let config = ClusteringConfig::default();
        assert_eq!(cluster_nominal_values(&series, &config).unwrap(), vec![20.0]);

        let config = ClusteringConfig {
            noise: NoisePolicy::Exclude,
            ..ClusteringConfig::default()
        };
        assert!(cluster_nominal_values(&series, &config).unwrap().is_empty());
    }

    #[test]
    fn test_noise_listed_first() {
        let mut series = vec![7.0; 12];
        series.push(100.0);

        let labels = label_clusters(&series, 0.001, 10).unwrap();
        assert_eq!(labels[12], NOISE);
        assert_eq!(label_counts(&labels).get(&0), Some(&12));

        let values = unique_values(&series, 0.001, 10, NoisePolicy::Include).unwrap();
        assert_eq!(values, vec![100.0, 7.0]);
    }

    #[test]
    fn test_constant_series_and_rounding() {
        let values = unique_values(&[1.26; 12], 0.001, 10, NoisePolicy::Include).unwrap();
        assert_eq!(values, vec![1.3]);
    }

    #[test]
    fn test_rounding_ties_go_to_even() {
        let values = unique_values(&[2.25; 12], 0.001, 10, NoisePolicy::Include).unwrap();
        assert_eq!(values, vec![2.2]);
        let values = unique_values(&[0.25; 12], 0.001, 10, NoisePolicy::Include).unwrap();
        assert_eq!(values, vec![0.2]);
        assert_eq!(round_to(3.5, 0), 4.0);
        assert_eq!(round_to(2.5, 0), 2.0);
    }

    #[test]
    fn test_empty_series() {
        assert!(label_clusters(&[], 0.001, 10).unwrap().is_empty());
        assert!(unique_values(&[], 0.001, 10, NoisePolicy::Include)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(
            label_clusters(&[1.0, 2.0], 0.0, 2),
            Err(ClusteringError::InvalidEps(_))
        ));
        assert!(matches!(
            label_clusters(&[1.0, f64::NAN], 0.1, 2),
            Err(ClusteringError::NonFinite(1))
        ));
    }
}
