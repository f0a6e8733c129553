//! Configuration types for the magnetometry pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the noise group (label -1) is treated when reporting nominal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoisePolicy {
    /// Report the mean of the noise points as its own value.
    ///
    /// A series holding a single nominal value whose noise is wider than
    /// `eps` is labelled entirely as noise; this policy still recovers it.
    #[default]
    Include,
    /// Drop the noise points from the result.
    Exclude,
}

/// Configuration for reading instrument files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// Treat an unclassifiable measurement type as an error instead of
    /// producing a table without moment columns.
    #[serde(default)]
    pub strict_measurement_type: bool,
}

/// Configuration for DBSCAN nominal-value clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Neighbourhood radius in standardized units
    #[serde(default = "default_eps")]
    pub eps: f64,

    /// Minimum neighbourhood size (self included) for a core point
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Whether the noise group is reported as a nominal value
    #[serde(default)]
    pub noise: NoisePolicy,
}

fn default_eps() -> f64 {
    0.001
}

fn default_min_samples() -> usize {
    10
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            min_samples: default_min_samples(),
            noise: NoisePolicy::default(),
        }
    }
}

/// Configuration for z-score outlier detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierConfig {
    /// Number of standard deviations beyond which a sample is an outlier
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    3.0
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

/// Configuration for the temperature turnaround search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnaroundConfig {
    /// Threshold handed to the outlier detector over temperature steps
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Samples ignored at each end when searching for the inflection
    #[serde(default = "default_edge_trim")]
    pub edge_trim: usize,
}

fn default_edge_trim() -> usize {
    20
}

impl Default for TurnaroundConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            edge_trim: default_edge_trim(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub parsing: ParsingConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub outliers: OutlierConfig,

    #[serde(default)]
    pub turnaround: TurnaroundConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.clustering.eps, 0.001);
        assert_eq!(config.clustering.min_samples, 10);
        assert_eq!(config.clustering.noise, NoisePolicy::Include);
        assert_eq!(config.outliers.threshold, 3.0);
        assert_eq!(config.turnaround.edge_trim, 20);
        assert!(!config.parsing.strict_measurement_type);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml =
            "clustering:\n  min_samples: 5\n  noise: exclude\nturnaround:\n  edge_trim: 10\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.clustering.min_samples, 5);
        assert_eq!(config.clustering.eps, 0.001);
        assert_eq!(config.clustering.noise, NoisePolicy::Exclude);
        assert_eq!(config.turnaround.edge_trim, 10);
        assert_eq!(config.turnaround.threshold, 3.0);
        assert_eq!(config.outliers.threshold, 3.0);
    }

    #[test]
    fn test_yaml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");

        let mut config = PipelineConfig::default();
        config.parsing.strict_measurement_type = true;
        config.outliers.threshold = 2.5;
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert!(loaded.parsing.strict_measurement_type);
        assert_eq!(loaded.outliers.threshold, 2.5);
    }
}
