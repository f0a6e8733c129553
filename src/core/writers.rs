//! CSV writers for derived tables.
//!
//! - The canonical magnetometry table (`time,temp,field,moment,moment_err`)
//! - Per-sample cluster labels (`value,label`)
//!
//! Missing values (`NaN`) are written as empty cells.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use super::transforms::{MagneticTable, CANONICAL_COLUMNS};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Mismatched array lengths.
    #[error("array length mismatch: {values_len} values, {labels_len} labels")]
    LengthMismatch { values_len: usize, labels_len: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Opens a CSV writer on `path`, creating parent directories first.
fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::Writer::from_writer(BufWriter::new(file)))
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

/// Write the canonical table to CSV.
///
/// The moment columns are written only when the table has them.
///
/// # Errors
///
/// Returns an error if the file or its parent directories cannot be created
/// or written.
///
/// # Example
///
/// ```no_run
/// use magnetometry_pipeline::core::transforms::load_magnetic_table;
/// use magnetometry_pipeline::core::writers::write_magnetic_csv;
/// use std::path::Path;
///
/// let table = load_magnetic_table("zfc_fc.dat").unwrap();
/// write_magnetic_csv(Path::new("zfc_fc.csv"), &table).unwrap();
/// ```
pub fn write_magnetic_csv(path: &Path, table: &MagneticTable) -> Result<()> {
    let mut csv_writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();

    let columns: Vec<(&str, &[f64])> = CANONICAL_COLUMNS
        .iter()
        .filter_map(|&name| table.column(name).map(|values| (name, values)))
        .collect();

    csv_writer
        .write_record(columns.iter().map(|(name, _)| *name))
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for i in 0..table.len() {
        csv_writer
            .write_record(columns.iter().map(|(_, values)| format_value(values[i])))
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write each sample with its cluster label to CSV (`value,label`).
///
/// # Errors
///
/// Returns an error if the slices differ in length or the file cannot be
/// written.
pub fn write_labels_csv(path: &Path, values: &[f64], labels: &[i32]) -> Result<()> {
    if values.len() != labels.len() {
        return Err(WriteError::LengthMismatch {
            values_len: values.len(),
            labels_len: labels.len(),
        });
    }

    let mut csv_writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();

    csv_writer
        .write_record(["value", "label"])
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for (value, label) in values.iter().zip(labels) {
        csv_writer
            .write_record(&[format_value(*value), label.to_string()])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transforms::MeasurementType;
    use std::fs;
    use tempfile::tempdir;

    fn create_test_table(measurement: MeasurementType) -> MagneticTable {
        let has_moment = measurement != MeasurementType::Unknown;
        MagneticTable {
            measurement,
            time: vec![0.0, 1.5],
            temp: vec![300.0, f64::NAN],
            field: vec![1000.0, 1000.0],
            moment: has_moment.then(|| vec![1e-3, 2e-3]),
            moment_err: has_moment.then(|| vec![1e-6, 1e-6]),
        }
    }

    #[test]
    fn test_write_magnetic_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");

        write_magnetic_csv(&path, &create_test_table(MeasurementType::Vsm)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "time,temp,field,moment,moment_err");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "0,300,1000,0.001,0.000001");
        // NaN temperature is an empty cell
        assert!(lines[2].starts_with("1.5,,1000,"));
    }

    #[test]
    fn test_write_magnetic_csv_unknown_type_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");

        write_magnetic_csv(&path, &create_test_table(MeasurementType::Unknown)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().next(), Some("time,temp,field"));
    }

    #[test]
    fn test_write_labels_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.csv");

        write_labels_csv(&path, &[5.0, 10.0, 7.5], &[0, 1, -1]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines, vec!["value,label", "5,0", "10,1", "7.5,-1"]);
    }

    #[test]
    fn test_write_labels_csv_length_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.csv");

        match write_labels_csv(&path, &[1.0], &[0, 1]) {
            Err(WriteError::LengthMismatch {
                values_len,
                labels_len,
            }) => {
                assert_eq!(values_len, 1);
                assert_eq!(labels_len, 2);
            }
            other => panic!("Expected LengthMismatch error, got {:?}", other),
        }
        assert!(!path.exists());
    }
}
