//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{parse_data, parse_header, DataTable, Header, LoaderError};
pub use transforms::{
    classify_measurement, load_magnetic_table, normalize_columns, MagneticTable, MeasurementType,
};
pub use writers::{write_labels_csv, write_magnetic_csv, WriteError};
