//! Temperature turnaround detection for ZFC/FC runs.
//!
//! A ZFC/FC file holds two thermal ramps back to back. Two protocols are
//! handled:
//!
//! - **Inflection**: the temperature rises during ZFC and then falls during
//!   FC. No temperature step stands out, and the turnaround is the sample
//!   whose step is closest to zero, searched away from the edges of the run.
//! - **Reset**: the temperature rises during ZFC, is reset to a low value,
//!   and rises again during FC. The reset is a step far outside the others,
//!   and the turnaround is the first such step.
//!
//! The branch is chosen by running the z-score outlier detector over the
//! temperature steps.

use log::info;
use thiserror::Error;

use crate::config::TurnaroundConfig;
use crate::core::loaders::{DataTable, LoaderError};
use crate::core::transforms::{diff, MagneticTable, TEMPERATURE};

use super::outliers::find_outliers;

/// Errors that can occur while locating the turnaround.
#[derive(Error, Debug)]
pub enum TurnaroundError {
    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("need at least {needed} samples to search for an inflection, got {len}")]
    TooFewSamples { len: usize, needed: usize },

    #[error("no finite temperature step inside the search window")]
    NoFiniteSteps,
}

/// Result type for turnaround operations.
pub type Result<T> = std::result::Result<T, TurnaroundError>;

/// Which protocol produced the turnaround.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnaroundKind {
    /// Rise then fall; index of the step closest to zero.
    Inflection,
    /// Rise, reset, rise; index of the first sample after the reset.
    Reset,
}

/// Position of the boundary between the ZFC and FC segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turnaround {
    pub index: usize,
    pub kind: TurnaroundKind,
}

/// Locate the turnaround in a temperature series.
///
/// # Errors
///
/// Returns an error on the inflection branch if the series is too short to
/// leave at least two samples once `edge_trim` samples are dropped from each
/// end, or if every step in that window is NaN.
pub fn find_temperature_turnaround(
    temps: &[f64],
    config: &TurnaroundConfig,
) -> Result<Turnaround> {
    let steps = diff(temps);

    if let Some(&index) = find_outliers(&steps, config.threshold).first() {
        info!("temperature reset at sample {} (step {:.3} K)", index, steps[index]);
        return Ok(Turnaround {
            index,
            kind: TurnaroundKind::Reset,
        });
    }

    let needed = 2 * config.edge_trim + 2;
    if temps.len() < needed {
        return Err(TurnaroundError::TooFewSamples {
            len: temps.len(),
            needed,
        });
    }

    // The first sample of the window has no step inside it
    let start = config.edge_trim + 1;
    let end = temps.len() - config.edge_trim;

    let index = (start..end)
        .filter(|&i| !steps[i].is_nan())
        .min_by(|&a, &b| steps[a].abs().total_cmp(&steps[b].abs()))
        .ok_or(TurnaroundError::NoFiniteSteps)?;

    info!("temperature inflection at sample {}", index);
    Ok(Turnaround {
        index,
        kind: TurnaroundKind::Inflection,
    })
}

/// Locate the turnaround from the raw `"Temperature (K)"` column.
///
/// # Errors
///
/// Returns an error if the column is absent or unparseable, or see
/// [`find_temperature_turnaround`].
pub fn find_turnaround(table: &DataTable, config: &TurnaroundConfig) -> Result<Turnaround> {
    let temps = table.float_column(TEMPERATURE)?;
    find_temperature_turnaround(&temps, config)
}

/// A canonical table split at its turnaround.
#[derive(Debug, Clone)]
pub struct ZfcFcSplit {
    pub turnaround: Turnaround,
    /// Rows before the turnaround.
    pub zfc: MagneticTable,
    /// Rows from the turnaround on.
    pub fc: MagneticTable,
}

/// Split a canonical table into its ZFC and FC segments.
///
/// # Errors
///
/// See [`find_temperature_turnaround`].
pub fn split_zfc_fc(table: &MagneticTable, config: &TurnaroundConfig) -> Result<ZfcFcSplit> {
    let turnaround = find_temperature_turnaround(&table.temp, config)?;
    Ok(ZfcFcSplit {
        turnaround,
        zfc: table.slice(0..turnaround.index),
        fc: table.slice(turnaround.index..table.len()),
    })
}
