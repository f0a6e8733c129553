//! Parsing and analysis pipeline for magnetometer `.dat` files.
//!
//! This crate provides tools for:
//! - Splitting a `.dat` file into its metadata header and `[Data]` table
//! - Normalizing VSM and DC scan columns to a canonical time/temp/field/moment table
//! - Recovering nominal set points from noisy series with 1-D DBSCAN (parallelized)
//! - Z-score outlier detection and ZFC/FC turnaround location
//!
//! # Example
//!
//! ```no_run
//! use magnetometry_pipeline::{
//!     core::transforms::load_magnetic_table, processors::clustering::cluster_nominal_values,
//!     ClusteringConfig,
//! };
//!
//! let table = load_magnetic_table("run.dat").unwrap();
//! let temps = cluster_nominal_values(&table.temp, &ClusteringConfig::default()).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{
    ClusteringConfig, NoisePolicy, OutlierConfig, ParsingConfig, PipelineConfig, TurnaroundConfig,
};
pub use core::loaders::{DataTable, Header};
pub use core::transforms::{MagneticTable, MeasurementType};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
