//! Command-line interface for the magnetometry pipeline.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{ClusteringConfig, NoisePolicy, OutlierConfig, TurnaroundConfig};
use crate::core::loaders::{parse_data, parse_header};
use crate::core::transforms::{normalize_columns, MagneticTable, CANONICAL_COLUMNS};
use crate::core::writers::{write_labels_csv, write_magnetic_csv};
use crate::processors::{clustering, outliers, turnaround};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "magnetometry-pipeline")]
#[command(about = "Magnetometer .dat parsing and nominal-value extraction", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the metadata header of a .dat file
    Header {
        /// Input .dat file
        file: PathBuf,
    },

    /// Write the canonical time/temp/field/moment table as CSV
    Simplify {
        /// Input .dat file
        file: PathBuf,
        /// Output CSV (defaults to the input name with .csv extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract the nominal values of a noisy column by DBSCAN clustering
    Nominal {
        /// Input .dat file
        file: PathBuf,
        /// Canonical column (time, temp, field, moment, moment_err)
        #[arg(long, default_value = "temp")]
        column: String,
        /// Neighbourhood radius in standardized units
        #[arg(long)]
        eps: Option<f64>,
        /// Minimum samples per core neighbourhood
        #[arg(long)]
        min_samples: Option<usize>,
        /// Leave the noise group out of the nominal values
        #[arg(long)]
        exclude_noise: bool,
        /// Write per-sample cluster labels to this CSV
        #[arg(long)]
        labels_out: Option<PathBuf>,
    },

    /// List z-score outliers of a column
    Outliers {
        /// Input .dat file
        file: PathBuf,
        /// Canonical column (time, temp, field, moment, moment_err)
        #[arg(long, default_value = "moment")]
        column: String,
        /// Number of standard deviations
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Find the ZFC/FC temperature turnaround
    Turnaround {
        /// Input .dat file
        file: PathBuf,
        /// Samples ignored at each end when searching for an inflection
        #[arg(long)]
        edge_trim: Option<usize>,
        /// Write zfc.csv and fc.csv into this directory
        #[arg(long)]
        split_dir: Option<PathBuf>,
    },

    /// Plot moment vs temperature (PNG), ZFC and FC coloured
    Plot {
        /// Input .dat file
        file: PathBuf,
        /// Output PNG file path (defaults to the input name with .png extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Maximum number of points to plot (subsamples if exceeded)
        #[arg(long, default_value_t = 100_000)]
        max_points: usize,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 38 {
            format!("{}...", value.chars().take(35).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<19}: {:<38} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Header { file } => cmd_header(&file),
        Commands::Simplify { file, output } => cmd_simplify(&file, output, &config),
        Commands::Nominal { file, column, eps, min_samples, exclude_noise, labels_out } => {
            let clustering_config = ClusteringConfig {
                eps: eps.unwrap_or(config.clustering.eps),
                min_samples: min_samples.unwrap_or(config.clustering.min_samples),
                noise: if exclude_noise { NoisePolicy::Exclude } else { config.clustering.noise },
            };
            cmd_nominal(&file, &column, &clustering_config, labels_out.as_deref(), &config)
        }
        Commands::Outliers { file, column, threshold } => {
            let outlier_config = OutlierConfig {
                threshold: threshold.unwrap_or(config.outliers.threshold),
            };
            cmd_outliers(&file, &column, &outlier_config, &config)
        }
        Commands::Turnaround { file, edge_trim, split_dir } => {
            let turnaround_config = TurnaroundConfig {
                edge_trim: edge_trim.unwrap_or(config.turnaround.edge_trim),
                ..config.turnaround.clone()
            };
            cmd_turnaround(&file, &turnaround_config, split_dir.as_deref(), &config)
        }
        Commands::Plot { file, output, max_points } => cmd_plot(&file, output, max_points, &config),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Parse and normalize a file, applying the strictness setting.
fn load_table(file: &Path, config: &PipelineConfig) -> Result<MagneticTable> {
    let raw = parse_data(file).with_context(|| format!("failed to parse {}", file.display()))?;
    let table = normalize_columns(&raw)
        .with_context(|| format!("failed to normalize {}", file.display()))?;
    if config.parsing.strict_measurement_type {
        table.require_moment()?;
    }
    Ok(table)
}

/// A canonical column with non-finite samples dropped.
fn finite_column(table: &MagneticTable, column: &str) -> Result<Vec<f64>> {
    let values = table.column(column).ok_or_else(|| {
        anyhow!(
            "column '{}' not available (expected one of {:?}, moment columns need a known measurement type)",
            column,
            CANONICAL_COLUMNS
        )
    })?;
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < values.len() {
        warn!(
            "{}: dropped {} missing value(s)",
            column,
            values.len() - finite.len()
        );
    }
    Ok(finite)
}

fn cmd_header(file: &Path) -> Result<()> {
    let header = parse_header(file).with_context(|| format!("failed to read {}", file.display()))?;

    for row in header.rows() {
        println!("{}", row.join(" | "));
    }

    print_summary(
        "Header",
        &[
            ("Input file", file.display().to_string()),
            ("Header lines", header.len().to_string()),
            ("Title", header.value("TITLE").unwrap_or("-").to_string()),
        ],
    );
    Ok(())
}

fn cmd_simplify(file: &Path, output: Option<PathBuf>, config: &PipelineConfig) -> Result<()> {
    let start = Instant::now();

    let output_path = output.unwrap_or_else(|| file.with_extension("csv"));

    let spinner = create_spinner("Parsing data table...");
    let table = load_table(file, config);
    spinner.finish_and_clear();
    let table = table?;

    write_magnetic_csv(&output_path, &table)?;

    print_summary(
        "Simplify Complete",
        &[
            ("Input file", file.display().to_string()),
            ("Output CSV", output_path.display().to_string()),
            ("Measurement type", table.measurement.to_string()),
            ("Rows", table.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_nominal(
    file: &Path,
    column: &str,
    clustering_config: &ClusteringConfig,
    labels_out: Option<&Path>,
    config: &PipelineConfig,
) -> Result<()> {
    let start = Instant::now();

    let table = load_table(file, config)?;
    let series = finite_column(&table, column)?;

    let spinner = create_spinner("Clustering values...");
    let values = clustering::cluster_nominal_values(&series, clustering_config);
    spinner.finish_and_clear();
    let values = values?;

    let mut summary = vec![
        ("Input file", file.display().to_string()),
        ("Column", column.to_string()),
        ("Samples", series.len().to_string()),
        ("Nominal values", format!("{:?}", values)),
        ("eps", clustering_config.eps.to_string()),
        ("min_samples", clustering_config.min_samples.to_string()),
        ("Noise", format!("{:?}", clustering_config.noise)),
    ];

    if let Some(path) = labels_out {
        let labels = clustering::label_clusters(
            &series,
            clustering_config.eps,
            clustering_config.min_samples,
        )?;
        write_labels_csv(path, &series, &labels)?;
        info!("cluster sizes: {:?}", clustering::label_counts(&labels));
        summary.push(("Labels CSV", path.display().to_string()));
    }

    summary.push(("Duration", format!("{:.2?}", start.elapsed())));
    print_summary("Nominal Values", &summary);
    Ok(())
}

fn cmd_outliers(
    file: &Path,
    column: &str,
    outlier_config: &OutlierConfig,
    config: &PipelineConfig,
) -> Result<()> {
    let table = load_table(file, config)?;
    let values = table
        .column(column)
        .ok_or_else(|| anyhow!("column '{}' not available", column))?;

    let indices = outliers::find_outliers_with(values, outlier_config);
    for &i in &indices {
        println!("{}\t{}", i, values[i]);
    }

    print_summary(
        "Outliers",
        &[
            ("Input file", file.display().to_string()),
            ("Column", column.to_string()),
            ("Threshold", outlier_config.threshold.to_string()),
            ("Outliers found", indices.len().to_string()),
        ],
    );
    Ok(())
}

fn cmd_turnaround(
    file: &Path,
    turnaround_config: &TurnaroundConfig,
    split_dir: Option<&Path>,
    config: &PipelineConfig,
) -> Result<()> {
    let raw = parse_data(file).with_context(|| format!("failed to parse {}", file.display()))?;
    let found = turnaround::find_turnaround(&raw, turnaround_config)?;

    let table = normalize_columns(&raw)
        .with_context(|| format!("failed to normalize {}", file.display()))?;
    if config.parsing.strict_measurement_type {
        table.require_moment()?;
    }

    let mut summary = vec![
        ("Input file", file.display().to_string()),
        ("Turnaround index", found.index.to_string()),
        ("Protocol", format!("{:?}", found.kind)),
        ("Temperature (K)", table.temp[found.index].to_string()),
    ];

    if let Some(dir) = split_dir {
        let split = turnaround::split_zfc_fc(&table, turnaround_config)?;
        let zfc_path = dir.join("zfc.csv");
        let fc_path = dir.join("fc.csv");
        write_magnetic_csv(&zfc_path, &split.zfc)?;
        write_magnetic_csv(&fc_path, &split.fc)?;
        summary.push(("ZFC rows", split.zfc.len().to_string()));
        summary.push(("FC rows", split.fc.len().to_string()));
        summary.push(("Output directory", dir.display().to_string()));
    }

    print_summary("Turnaround", &summary);
    Ok(())
}

fn cmd_plot(
    file: &Path,
    output: Option<PathBuf>,
    max_points: usize,
    config: &PipelineConfig,
) -> Result<()> {
    use crate::visualization;

    let start = Instant::now();

    let output_path = output.unwrap_or_else(|| file.with_extension("png"));

    let table = load_table(file, config)?;
    let turnaround_index =
        match turnaround::find_temperature_turnaround(&table.temp, &config.turnaround) {
            Ok(found) => Some(found.index),
            Err(e) => {
                warn!("No turnaround found ({}); plotting a single segment", e);
                None
            }
        };

    let spinner = create_spinner("Generating plot...");
    let result = visualization::plot_moment_vs_temperature(
        &output_path,
        &table,
        turnaround_index,
        max_points,
    );
    spinner.finish_and_clear();
    result?;

    print_summary(
        "Visualization Complete",
        &[
            ("Input file", file.display().to_string()),
            ("Output PNG", output_path.display().to_string()),
            ("Points in table", table.len().to_string()),
            (
                "Turnaround index",
                turnaround_index.map_or("-".to_string(), |i| i.to_string()),
            ),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}
