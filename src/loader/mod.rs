//! Dataset loading for CSV and JSON sensor exports.
//!
//! This module decodes raw rows, validates them once against the typed
//! record schema, and applies the configured policy for rows whose
//! timestamp cannot be parsed.

use crate::error::LoadError;
use crate::models::{CongestionLevel, Dataset, TrafficRecord};
use chrono::{DateTime, NaiveDateTime};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Supported input encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("csv") => Some(InputFormat::Csv),
            Some("json") => Some(InputFormat::Json),
            _ => None,
        }
    }
}

/// What to do with a row whose timestamp does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampPolicy {
    /// Fail the load, naming the offending row.
    #[default]
    Reject,
    /// Skip the row with a warning.
    Drop,
}

/// Options controlling how a dataset is read.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Forced input format (None to infer from the extension).
    pub format: Option<InputFormat>,
    /// Lines starting with this byte are skipped in CSV input.
    pub comment_char: Option<u8>,
    pub timestamp_policy: TimestampPolicy,
    /// Naive timestamp layouts tried after RFC 3339.
    pub timestamp_formats: Vec<String>,
    /// Whether to show a spinner while loading.
    pub show_progress: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            format: None,
            comment_char: Some(b'#'),
            timestamp_policy: TimestampPolicy::Reject,
            timestamp_formats: vec![
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%d %H:%M".to_string(),
            ],
            show_progress: false,
        }
    }
}

impl From<&crate::config::LoaderConfig> for LoadOptions {
    fn from(config: &crate::config::LoaderConfig) -> Self {
        Self {
            format: config.format,
            comment_char: config.comment_byte().ok().flatten(),
            timestamp_policy: config.invalid_timestamps,
            timestamp_formats: config.timestamp_formats.clone(),
            show_progress: false,
        }
    }
}

/// Counts above 2^53 lose integer precision once decoded as `f64`.
const MAX_VEHICLE_COUNT: f64 = 9_007_199_254_740_992.0;

/// A loaded dataset plus bookkeeping about skipped rows.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub records: Dataset,
    /// Rows skipped under [`TimestampPolicy::Drop`].
    pub dropped: usize,
}

/// A row as it appears in the input, before validation.
#[derive(Debug, Deserialize)]
struct RawRecord {
    timestamp: String,
    location: String,
    road_type: String,
    vehicle_count: f64,
    avg_speed_kmh: f64,
    congestion_level: String,
}

/// Load a dataset from a file.
pub fn load_dataset(path: &Path, options: &LoadOptions) -> Result<LoadOutcome, LoadError> {
    let format = match options.format.or_else(|| InputFormat::from_path(path)) {
        Some(f) => f,
        None => return Err(LoadError::UnknownFormat(path.to_path_buf())),
    };

    info!("Loading {:?} data from {}", format, path.display());

    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let spinner = options.show_progress.then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Reading {}", path.display()));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let outcome = match format {
        InputFormat::Csv => read_csv(reader, options),
        InputFormat::Json => read_json(reader, options),
    };

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let outcome = outcome?;
    info!(
        "Loaded {} records ({} dropped)",
        outcome.records.len(),
        outcome.dropped
    );

    Ok(outcome)
}

/// Read CSV input with a header row.
pub fn read_csv<R: Read>(reader: R, options: &LoadOptions) -> Result<LoadOutcome, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .comment(options.comment_char)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let raw: RawRecord = result?;
        rows.push(raw);
    }

    validate_rows(rows, options)
}

/// Read a JSON array of record objects.
pub fn read_json<R: Read>(reader: R, options: &LoadOptions) -> Result<LoadOutcome, LoadError> {
    let rows: Vec<RawRecord> = serde_json::from_reader(reader)?;
    validate_rows(rows, options)
}

fn validate_rows(rows: Vec<RawRecord>, options: &LoadOptions) -> Result<LoadOutcome, LoadError> {
    let mut records = Vec::with_capacity(rows.len());
    let mut dropped = 0;

    for (i, raw) in rows.into_iter().enumerate() {
        let row = i + 1;
        match validate_row(raw, row, options)? {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }

    debug!("Validated {} rows, dropped {}", records.len(), dropped);

    Ok(LoadOutcome { records, dropped })
}

/// Check one raw row against the schema. `Ok(None)` means the row was dropped.
fn validate_row(
    raw: RawRecord,
    row: usize,
    options: &LoadOptions,
) -> Result<Option<TrafficRecord>, LoadError> {
    let invalid = |reason: String| LoadError::InvalidRecord { row, reason };

    let timestamp = match parse_timestamp(&raw.timestamp, &options.timestamp_formats) {
        Some(t) => t,
        None => match options.timestamp_policy {
            TimestampPolicy::Reject => {
                return Err(LoadError::InvalidTimestamp {
                    row,
                    value: raw.timestamp,
                })
            }
            TimestampPolicy::Drop => {
                warn!(row, value = %raw.timestamp, "Dropping row with unparseable timestamp");
                return Ok(None);
            }
        },
    };

    if raw.location.is_empty() {
        return Err(invalid("location is empty".to_string()));
    }

    if !raw.vehicle_count.is_finite() || raw.vehicle_count < 0.0 || raw.vehicle_count.fract() != 0.0
    {
        return Err(invalid(format!(
            "vehicle_count must be a non-negative integer, got {}",
            raw.vehicle_count
        )));
    }
    if raw.vehicle_count > MAX_VEHICLE_COUNT {
        return Err(invalid(format!(
            "vehicle_count {} exceeds the largest exactly representable count {}",
            raw.vehicle_count, MAX_VEHICLE_COUNT
        )));
    }

    if !raw.avg_speed_kmh.is_finite() || raw.avg_speed_kmh < 0.0 {
        return Err(invalid(format!(
            "avg_speed_kmh must be a non-negative number, got {}",
            raw.avg_speed_kmh
        )));
    }

    let congestion_level: CongestionLevel = raw.congestion_level.parse().map_err(invalid)?;

    Ok(Some(TrafficRecord {
        timestamp,
        location: raw.location,
        road_type: raw.road_type,
        vehicle_count: raw.vehicle_count as u64,
        avg_speed_kmh: raw.avg_speed_kmh,
        congestion_level,
    }))
}

/// Parse a timestamp, keeping wall-clock time for offset-qualified values.
pub fn parse_timestamp(value: &str, formats: &[String]) -> Option<NaiveDateTime> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }

    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}
