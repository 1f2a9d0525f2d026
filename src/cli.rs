//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::loader::InputFormat;
use clap::Parser;
use std::path::PathBuf;

/// Flowstat - descriptive statistics for traffic-sensor datasets
///
/// Loads a CSV or JSON traffic dataset, computes global, per-location,
/// per-hour and per-congestion statistics plus correlations, and exports
/// a JSON summary (and optionally a Markdown report with text charts).
///
/// Examples:
///   flowstat traffic_flow_data.csv
///   flowstat data.json --output summary.json --report report.md
///   flowstat data.csv --fields vehicle_count,avg_speed_kmh,hour
///   flowstat --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Dataset to analyze (.csv or .json)
    #[arg(value_name = "INPUT", default_value = "traffic_flow_data.csv")]
    pub input: PathBuf,

    /// Input format, overriding detection from the file extension
    #[arg(long, value_name = "FORMAT")]
    pub input_format: Option<InputFormat>,

    /// Output file path for the JSON summary
    ///
    /// Default: from config or traffic_flow_summary.json
    #[arg(short, long, value_name = "FILE", env = "FLOWSTAT_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Also write a Markdown report with text charts to this path
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Fields for the correlation matrix (comma-separated)
    ///
    /// Known fields: vehicle_count, avg_speed_kmh, congestion_level, hour
    #[arg(long, value_name = "FIELDS", value_delimiter = ',')]
    pub fields: Option<Vec<String>>,

    /// Fail when the dataset contains no records
    #[arg(long)]
    pub require_non_empty: bool,

    /// Skip rows with unparseable timestamps instead of failing
    #[arg(long)]
    pub drop_invalid_timestamps: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .flowstat.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .flowstat.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if !self.input.exists() {
            return Err(format!("Input file does not exist: {}", self.input.display()));
        }
        if !self.input.is_file() {
            return Err(format!("Input path is not a file: {}", self.input.display()));
        }

        if let Some(ref fields) = self.fields {
            if fields.iter().all(|f| f.trim().is_empty()) {
                return Err("--fields needs at least one field name".to_string());
            }
        }

        if let (Some(output), Some(report)) = (&self.output, &self.report) {
            if output == report {
                return Err("--output and --report must be different files".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
