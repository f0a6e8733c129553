//! Table and series transformations.
//!
//! This module turns a raw [`DataTable`] into the canonical [`MagneticTable`]
//! (`time`, `temp`, `field`, `moment`, `moment_err`) and provides the small
//! numeric series helpers shared by the processors: NaN-aware mean and
//! standard deviation, standardization, and successive differences.

use std::fmt;
use std::ops::Range;
use std::path::Path;

use log::{debug, warn};

use super::loaders::{parse_data, DataTable, LoaderError, Result};

/// Raw column holding the instrument timestamp.
pub const TIME_STAMP: &str = "Time Stamp (sec)";
/// Raw column holding the sample temperature.
pub const TEMPERATURE: &str = "Temperature (K)";
/// Raw column holding the applied field.
pub const MAGNETIC_FIELD: &str = "Magnetic Field (Oe)";
/// VSM moment and its standard error.
pub const VSM_MOMENT: &str = "Moment (emu)";
pub const VSM_MOMENT_ERR: &str = "M. Std. Err. (emu)";
/// DC moment (free centre fit) and its error.
pub const DC_MOMENT: &str = "DC Moment Free Ctr (emu)";
pub const DC_MOMENT_ERR: &str = "DC Moment Err Free Ctr (emu)";

/// Canonical column names of a [`MagneticTable`], in output order.
pub const CANONICAL_COLUMNS: [&str; 5] = ["time", "temp", "field", "moment", "moment_err"];

/// Instrument measurement mode, told apart by which moment column is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementType {
    Vsm,
    Dc,
    Unknown,
}

impl MeasurementType {
    /// Raw (moment, moment error) columns for this mode.
    pub fn source_columns(self) -> Option<(&'static str, &'static str)> {
        match self {
            MeasurementType::Vsm => Some((VSM_MOMENT, VSM_MOMENT_ERR)),
            MeasurementType::Dc => Some((DC_MOMENT, DC_MOMENT_ERR)),
            MeasurementType::Unknown => None,
        }
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementType::Vsm => write!(f, "VSM"),
            MeasurementType::Dc => write!(f, "DC"),
            MeasurementType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Canonical magnetometry table.
#[derive(Debug, Clone, PartialEq)]
pub struct MagneticTable {
    /// Mode the moment columns were taken from.
    pub measurement: MeasurementType,
    /// Seconds since the earliest timestamp.
    pub time: Vec<f64>,
    /// Temperature in K.
    pub temp: Vec<f64>,
    /// Applied field in Oe.
    pub field: Vec<f64>,
    /// Moment in emu, absent for an unknown measurement type.
    pub moment: Option<Vec<f64>>,
    /// Moment error in emu, absent for an unknown measurement type.
    pub moment_err: Option<Vec<f64>>,
}

impl MagneticTable {
    #[inline]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Look up a canonical column by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        match name {
            "time" => Some(&self.time),
            "temp" => Some(&self.temp),
            "field" => Some(&self.field),
            "moment" => self.moment.as_deref(),
            "moment_err" => self.moment_err.as_deref(),
            _ => None,
        }
    }

    /// Moment and moment error, or an error if the measurement type was
    /// not recognised.
    pub fn require_moment(&self) -> Result<(&[f64], &[f64])> {
        match (&self.moment, &self.moment_err) {
            (Some(moment), Some(err)) => Ok((moment, err)),
            _ => Err(LoaderError::UnknownMeasurementType),
        }
    }

    /// Rows in `range`. Times keep their original offset.
    pub fn slice(&self, range: Range<usize>) -> MagneticTable {
        let end = range.end.min(self.len());
        let start = range.start.min(end);

        MagneticTable {
            measurement: self.measurement,
            time: self.time[start..end].to_vec(),
            temp: self.temp[start..end].to_vec(),
            field: self.field[start..end].to_vec(),
            moment: self.moment.as_ref().map(|v| v[start..end].to_vec()),
            moment_err: self.moment_err.as_ref().map(|v| v[start..end].to_vec()),
        }
    }
}

/// Classify the measurement mode of a raw table.
///
/// VSM if `"Moment (emu)"` has no missing values, else DC if
/// `"DC Moment Free Ctr (emu)"` has none, else unknown. An absent column
/// counts as incomplete.
pub fn classify_measurement(table: &DataTable) -> MeasurementType {
    if table.is_column_complete(VSM_MOMENT) {
        MeasurementType::Vsm
    } else if table.is_column_complete(DC_MOMENT) {
        MeasurementType::Dc
    } else {
        MeasurementType::Unknown
    }
}

/// Build the canonical table from a raw one.
///
/// `time` is shifted so the earliest timestamp is zero; `temp` and `field`
/// are copied; `moment`/`moment_err` come from the columns of the detected
/// [`MeasurementType`] and are left out when it is unknown.
///
/// # Errors
///
/// Returns an error if a required column is absent or holds text that is
/// not a number.
pub fn normalize_columns(table: &DataTable) -> Result<MagneticTable> {
    let missing: Vec<&str> = [TIME_STAMP, TEMPERATURE, MAGNETIC_FIELD]
        .into_iter()
        .filter(|name| !table.has_column(name))
        .collect();
    if !missing.is_empty() {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    }

    let stamps = table.float_column(TIME_STAMP)?;
    let t0 = nan_min(&stamps);
    let time = stamps.iter().map(|s| s - t0).collect();

    let measurement = classify_measurement(table);
    debug!("measurement type: {}", measurement);

    let (moment, moment_err) = match measurement.source_columns() {
        Some((moment_col, err_col)) => (
            Some(table.float_column(moment_col)?),
            Some(table.float_column(err_col)?),
        ),
        None => {
            warn!("measurement type unknown; moment columns omitted");
            (None, None)
        }
    };

    Ok(MagneticTable {
        measurement,
        time,
        temp: table.float_column(TEMPERATURE)?,
        field: table.float_column(MAGNETIC_FIELD)?,
        moment,
        moment_err,
    })
}

/// Parse a `.dat` file and normalize it in one step.
///
/// # Errors
///
/// See [`parse_data`] and [`normalize_columns`].
pub fn load_magnetic_table<P: AsRef<Path>>(path: P) -> Result<MagneticTable> {
    let table = parse_data(path)?;
    normalize_columns(&table)
}

/// Minimum ignoring NaN; NaN if nothing else is left.
fn nan_min(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .reduce(f64::min)
        .unwrap_or(f64::NAN)
}

/// Mean of the non-NaN values.
pub fn mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0f64, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Standard deviation of the non-NaN values with `ddof` delta degrees of
/// freedom (0 = population, 1 = sample).
pub fn std_dev(values: &[f64], ddof: usize) -> Option<f64> {
    let mu = mean(values)?;
    let (sq_sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0f64, 0usize), |(acc, count), v| (acc + (v - mu).powi(2), count + 1));
    (count > ddof).then(|| (sq_sum / (count - ddof) as f64).sqrt())
}

/// Scale to zero mean and unit population variance.
///
/// A zero-variance series maps to all zeros.
pub fn standardize(values: &[f64]) -> Vec<f64> {
    let (Some(mu), Some(sigma)) = (mean(values), std_dev(values, 0)) else {
        return values.to_vec();
    };
    let scale = if sigma > 0.0 { sigma } else { 1.0 };
    values.iter().map(|v| (v - mu) / scale).collect()
}

/// Successive differences; position 0 has no predecessor and is NaN.
pub fn diff(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(f64::NAN);
    out.extend(values.windows(2).map(|w| w[1] - w[0]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn table(headers: &[&str], rows: &[&[&str]]) -> DataTable {
        DataTable::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    const HEADERS: &[&str] = &[
        TIME_STAMP,
        TEMPERATURE,
        MAGNETIC_FIELD,
        VSM_MOMENT,
        VSM_MOMENT_ERR,
        DC_MOMENT,
        DC_MOMENT_ERR,
    ];

    #[test]
    fn test_classify_vsm_ignores_other_columns() {
        let t = table(
            HEADERS,
            &[
                &["10", "300", "100", "1e-3", "1e-6", "", ""],
                &["11", "299", "100", "2e-3", "", "5e-3", "1e-6"],
            ],
        );
        assert_eq!(classify_measurement(&t), MeasurementType::Vsm);
    }

    #[test]
    fn test_classify_dc() {
        let t = table(
            HEADERS,
            &[
                &["10", "300", "100", "", "", "5e-3", "1e-6"],
                &["11", "299", "100", "1e-3", "", "6e-3", "1e-6"],
            ],
        );
        assert_eq!(classify_measurement(&t), MeasurementType::Dc);
    }

    #[test]
    fn test_classify_unknown() {
        let t = table(
            HEADERS,
            &[
                &["10", "300", "100", "", "", "5e-3", "1e-6"],
                &["11", "299", "100", "1e-3", "", "", "1e-6"],
            ],
        );
        assert_eq!(classify_measurement(&t), MeasurementType::Unknown);

        let absent = table(&[TIME_STAMP, TEMPERATURE], &[&["1", "2"]]);
        assert_eq!(classify_measurement(&absent), MeasurementType::Unknown);
    }

    #[test]
    fn test_normalize_vsm() -> Result<()> {
        let t = table(
            HEADERS,
            &[
                &["1005.5", "300", "1000", "1e-3", "1e-6", "", ""],
                &["1000.5", "299", "1000", "2e-3", "2e-6", "", ""],
                &["1010.0", "298", "1000", "3e-3", "3e-6", "", ""],
            ],
        );

        let m = normalize_columns(&t)?;
        assert_eq!(m.measurement, MeasurementType::Vsm);
        assert_eq!(m.time, vec![5.0, 0.0, 9.5]);
        assert_eq!(m.temp, vec![300.0, 299.0, 298.0]);
        assert_eq!(m.field, vec![1000.0; 3]);
        assert_eq!(m.moment, Some(vec![1e-3, 2e-3, 3e-3]));
        assert_eq!(m.moment_err, Some(vec![1e-6, 2e-6, 3e-6]));

        let min_time = m.time.iter().copied().fold(f64::INFINITY, f64::min);
        assert_eq!(min_time, 0.0);

        Ok(())
    }

    #[test]
    fn test_normalize_dc_and_missing_timestamp() -> Result<()> {
        let t = table(
            HEADERS,
            &[
                &["", "300", "0", "", "", "5e-3", "1e-6"],
                &["20", "299", "0", "", "", "6e-3", "2e-6"],
                &["25", "298", "0", "", "", "7e-3", "3e-6"],
            ],
        );

        let m = normalize_columns(&t)?;
        assert_eq!(m.measurement, MeasurementType::Dc);
        assert!(m.time[0].is_nan());
        assert_eq!(&m.time[1..], &[0.0, 5.0]);
        assert_eq!(m.moment, Some(vec![5e-3, 6e-3, 7e-3]));

        Ok(())
    }

    #[test]
    fn test_normalize_unknown_omits_moment() -> Result<()> {
        let t = table(
            &[TIME_STAMP, TEMPERATURE, MAGNETIC_FIELD],
            &[&["3", "10", "5"], &["4", "11", "5"]],
        );

        let m = normalize_columns(&t)?;
        assert_eq!(m.measurement, MeasurementType::Unknown);
        assert!(m.moment.is_none());
        assert!(m.moment_err.is_none());
        assert!(m.column("moment").is_none());
        assert_eq!(m.column("temp"), Some(&[10.0, 11.0][..]));
        assert!(matches!(
            m.require_moment(),
            Err(LoaderError::UnknownMeasurementType)
        ));

        Ok(())
    }

    #[test]
    fn test_normalize_missing_required_column() {
        let t = table(&[TIME_STAMP, VSM_MOMENT], &[&["1", "2"]]);
        match normalize_columns(&t) {
            Err(LoaderError::MissingColumns(cols)) => {
                assert!(cols.contains(TEMPERATURE));
                assert!(cols.contains(MAGNETIC_FIELD));
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_slice_keeps_time_offset() -> Result<()> {
        let t = table(
            &[TIME_STAMP, TEMPERATURE, MAGNETIC_FIELD, VSM_MOMENT, VSM_MOMENT_ERR],
            &[
                &["0", "10", "1", "1", "0.1"],
                &["1", "11", "1", "2", "0.1"],
                &["2", "12", "1", "3", "0.1"],
            ],
        );
        let m = normalize_columns(&t)?;

        let tail = m.slice(1..3);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.time, vec![1.0, 2.0]);
        assert_eq!(tail.moment, Some(vec![2.0, 3.0]));

        assert!(m.slice(5..9).is_empty());

        Ok(())
    }

    #[test]
    fn test_load_magnetic_table() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[Header]").unwrap();
        writeln!(file, "[Data]").unwrap();
        writeln!(
            file,
            "{},{},{},{},{}",
            TIME_STAMP, TEMPERATURE, MAGNETIC_FIELD, VSM_MOMENT, VSM_MOMENT_ERR
        )
        .unwrap();
        writeln!(file, "50,5,100,1e-4,1e-7").unwrap();
        writeln!(file, "60,6,100,2e-4,1e-7").unwrap();
        file.flush().unwrap();

        let m = load_magnetic_table(file.path())?;
        assert_eq!(m.measurement, MeasurementType::Vsm);
        assert_eq!(m.time, vec![0.0, 10.0]);

        Ok(())
    }

    #[test]
    fn test_mean_and_std_skip_nan() {
        let v = [f64::NAN, 2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&v), Some(5.0));
        assert_eq!(std_dev(&v, 0), Some(2.0));
        assert!(mean(&[]).is_none());
        assert!(std_dev(&[1.0], 1).is_none());
    }

    #[test]
    fn test_standardize() {
        let z = standardize(&[1.0, 2.0, 3.0]);
        let sigma = (2.0f64 / 3.0).sqrt();
        assert!((z[0] + 1.0 / sigma).abs() < 1e-12);
        assert_eq!(z[1], 0.0);
        assert!((z[2] - 1.0 / sigma).abs() < 1e-12);

        assert_eq!(standardize(&[5.0, 5.0, 5.0]), vec![0.0, 0.0, 0.0]);
        assert!(standardize(&[]).is_empty());
    }

    #[test]
    fn test_diff() {
        let d = diff(&[1.0, 4.0, 2.0]);
        assert!(d[0].is_nan());
        assert_eq!(&d[1..], &[3.0, -2.0]);
        assert!(diff(&[]).is_empty());
    }
}
