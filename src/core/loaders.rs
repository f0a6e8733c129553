//! Data loaders for magnetometer `.dat` files.
//!
//! A `.dat` file is laid out as:
//! - A free-form metadata header, one tab-separated row per line
//! - A marker line whose first field is exactly `[Data]`
//! - A table with its own column-name row
//!
//! The table is nominally tab-delimited, but some instrument versions write
//! it comma-delimited. Parsing tries each [`Delimiter`] in
//! [`DATA_DELIMITERS`] order and keeps the first one that yields more than
//! one column.

use std::fs;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use log::{debug, warn};
use thiserror::Error;

/// First field of the line that separates the header from the data table.
pub const DATA_MARKER: &str = "[Data]";

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("No [Data] line in {0}")]
    MissingDataMarker(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Unknown measurement type: neither moment column is fully populated")]
    UnknownMeasurementType,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Field delimiter used for the data table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Tab,
    Comma,
}

impl Delimiter {
    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
        }
    }
}

/// Delimiters tried, in order, when parsing the data table.
pub const DATA_DELIMITERS: [Delimiter; 2] = [Delimiter::Tab, Delimiter::Comma];

/// Metadata rows preceding the data table, `[Data]` line included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    rows: Vec<Vec<String>>,
}

impl Header {
    /// All header rows, split on tabs.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of lines consumed by the header, i.e. the lines to skip
    /// before the table's column-name row.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Second field of the first row whose first field is `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.first().map(String::as_str) == Some(key))
            .and_then(|row| row.get(1))
            .map(String::as_str)
    }
}

/// Raw data table: column names plus string cells, no fixed schema.
#[derive(Debug, Clone)]
pub struct DataTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    delimiter: Delimiter,
}

impl DataTable {
    /// Build a table from column names and rows. Rows may be shorter than
    /// the header; absent cells read as missing.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers,
            rows,
            delimiter: Delimiter::Tab,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Delimiter the table was parsed with.
    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.headers.len()
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the column with exactly this name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell at (`row`, `col`), `None` if the row is too short.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// True if the column exists and no row has a missing value in it.
    pub fn is_column_complete(&self, name: &str) -> bool {
        match self.column_index(name) {
            Some(col) => (0..self.num_rows()).all(|row| !is_missing(self.cell(row, col))),
            None => false,
        }
    }

    /// Extract a column as floats. Missing cells become `NaN`.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist or a present cell is
    /// not a number.
    pub fn float_column(&self, name: &str) -> Result<Vec<f64>> {
        let col = self
            .column_index(name)
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))?;

        (0..self.num_rows())
            .map(|row| {
                let cell = self.cell(row, col);
                if is_missing(cell) {
                    return Ok(f64::NAN);
                }
                let text = cell.unwrap_or_default().trim();
                text.parse::<f64>().map_err(|_| {
                    LoaderError::ParseError(format!(
                        "column '{}', row {}: invalid number '{}'",
                        name, row, text
                    ))
                })
            })
            .collect()
    }
}

/// A cell is missing when absent, blank, or a textual NaN.
fn is_missing(cell: Option<&str>) -> bool {
    match cell {
        None => true,
        Some(s) => {
            let s = s.trim();
            s.is_empty() || s.eq_ignore_ascii_case("nan")
        }
    }
}

/// Read a file as text, replacing invalid UTF-8 (instrument headers often
/// carry Latin-1 unit symbols).
fn read_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Split file content into the header and the text after the `[Data]` line.
fn split_sections<'a>(content: &'a str, path: &Path) -> Result<(Header, &'a str)> {
    let mut rows = Vec::new();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        offset += line.len();

        let row: Vec<String> = line
            .trim_end_matches(&['\r', '\n'][..])
            .split('\t')
            .map(str::to_string)
            .collect();
        let is_marker = row.first().map(String::as_str) == Some(DATA_MARKER);
        rows.push(row);

        if is_marker {
            return Ok((Header { rows }, &content[offset..]));
        }
    }

    Err(LoaderError::MissingDataMarker(path.to_path_buf()))
}

/// Parse the metadata header of a `.dat` file.
///
/// Lines are read from the start of the file and split on tabs; reading
/// stops after the line whose first field is `[Data]`, which is included.
///
/// # Errors
///
/// Returns an error if the file cannot be read or has no `[Data]` line.
pub fn parse_header<P: AsRef<Path>>(path: P) -> Result<Header> {
    let path = path.as_ref();
    let content = read_lossy(path)?;
    let (header, _) = split_sections(&content, path)?;
    Ok(header)
}

/// Parse the data table of a `.dat` file.
///
/// The header lines are skipped, then the table is parsed tab-delimited. If
/// that yields a single column the same text is parsed again comma-delimited.
///
/// # Errors
///
/// Returns an error if the file cannot be read, has no `[Data]` line, or no
/// delimiter yields a multi-column table.
pub fn parse_data<P: AsRef<Path>>(path: P) -> Result<DataTable> {
    let path = path.as_ref();
    let content = read_lossy(path)?;
    let (header, body) = split_sections(&content, path)?;
    debug!("{}: skipping {} header lines", path.display(), header.len());

    for delimiter in DATA_DELIMITERS {
        let table = parse_table(body, delimiter)?;
        if table.num_columns() > 1 {
            debug!(
                "{}: {} rows x {} columns ({:?}-delimited)",
                path.display(),
                table.num_rows(),
                table.num_columns(),
                delimiter
            );
            return Ok(table);
        }
        warn!(
            "{}: {:?}-delimited parse gave {} column(s), trying next delimiter",
            path.display(),
            delimiter,
            table.num_columns()
        );
    }

    Err(LoaderError::ParseError(format!(
        "{}: data section has fewer than two columns with every delimiter",
        path.display()
    )))
}

/// Parse table text (column-name row first) with one delimiter.
fn parse_table(text: &str, delimiter: Delimiter) -> Result<DataTable> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter.as_byte())
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(DataTable {
        headers,
        rows,
        delimiter,
    })
}
