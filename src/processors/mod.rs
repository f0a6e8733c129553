//! Data processing modules.

pub mod clustering;
pub mod outliers;
pub mod turnaround;

// Re-export key types for convenience
pub use clustering::{
    cluster_nominal_values, dbscan_1d, label_clusters, unique_values, ClusteringError, NOISE,
};
pub use outliers::{find_outliers, find_outliers_with};
pub use turnaround::{
    find_temperature_turnaround, find_turnaround, split_zfc_fc, Turnaround, TurnaroundError,
    TurnaroundKind, ZfcFcSplit,
};
