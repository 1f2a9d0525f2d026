//! Data models for traffic analysis.
//!
//! This module contains the typed record schema, the catalogue of numeric
//! fields the aggregator understands, and the summary structures that are
//! rendered and exported.

use crate::error::AnalysisError;
use chrono::{NaiveDateTime, Timelike};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Timestamp layout used in reports.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Congestion level observed at a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
}

impl CongestionLevel {
    /// All levels in ordinal order.
    pub const ALL: [CongestionLevel; 3] = [
        CongestionLevel::Low,
        CongestionLevel::Medium,
        CongestionLevel::High,
    ];

    /// Ordinal encoding used for correlation (Low=1, Medium=2, High=3).
    pub fn ordinal(&self) -> u8 {
        match self {
            CongestionLevel::Low => 1,
            CongestionLevel::Medium => 2,
            CongestionLevel::High => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CongestionLevel::Low => "Low",
            CongestionLevel::Medium => "Medium",
            CongestionLevel::High => "High",
        }
    }
}

impl fmt::Display for CongestionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CongestionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(CongestionLevel::Low),
            "medium" => Ok(CongestionLevel::Medium),
            "high" => Ok(CongestionLevel::High),
            other => Err(format!("unknown congestion level '{}'", other)),
        }
    }
}

/// A single sensor observation. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficRecord {
    pub timestamp: NaiveDateTime,
    pub location: String,
    pub road_type: String,
    pub vehicle_count: u64,
    pub avg_speed_kmh: f64,
    pub congestion_level: CongestionLevel,
}

impl TrafficRecord {
    /// Hour of day (0-23) of the observation.
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

/// Records in load order.
pub type Dataset = Vec<TrafficRecord>;

/// Numeric (or ordinal-encoded) fields that statistics can be computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    VehicleCount,
    AvgSpeedKmh,
    /// Congestion level, ordinal-encoded.
    CongestionLevel,
    /// Hour of day extracted from the timestamp.
    Hour,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Field::VehicleCount,
        Field::AvgSpeedKmh,
        Field::CongestionLevel,
        Field::Hour,
    ];

    /// Fields reported in the global statistics section.
    pub const MEASURES: [Field; 2] = [Field::VehicleCount, Field::AvgSpeedKmh];

    /// Default correlation fields.
    pub const CORRELATED: [Field; 3] = [
        Field::VehicleCount,
        Field::AvgSpeedKmh,
        Field::CongestionLevel,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::VehicleCount => "vehicle_count",
            Field::AvgSpeedKmh => "avg_speed_kmh",
            Field::CongestionLevel => "congestion_level",
            Field::Hour => "hour",
        }
    }

    /// Value of this field for a record, or `None` when it is missing.
    pub fn value(&self, record: &TrafficRecord) -> Option<f64> {
        let v = match self {
            Field::VehicleCount => record.vehicle_count as f64,
            Field::AvgSpeedKmh => record.avg_speed_kmh,
            Field::CongestionLevel => record.congestion_level.ordinal() as f64,
            Field::Hour => record.hour() as f64,
        };
        v.is_finite().then_some(v)
    }

    /// Parse a list of field names, dropping repeats.
    pub fn parse_list(names: &[String]) -> Result<Vec<Field>, AnalysisError> {
        let fields = names
            .iter()
            .map(|n| n.parse())
            .collect::<Result<Vec<Field>, _>>()?;
        Ok(Field::unique(&fields))
    }

    /// Fields in first-seen order with repeats removed.
    pub fn unique(fields: &[Field]) -> Vec<Field> {
        let mut out: Vec<Field> = Vec::with_capacity(fields.len());
        for field in fields {
            if !out.contains(field) {
                out.push(*field);
            }
        }
        out
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "vehicle_count" => Ok(Field::VehicleCount),
            "avg_speed_kmh" => Ok(Field::AvgSpeedKmh),
            "congestion_level" | "congestion_numeric" => Ok(Field::CongestionLevel),
            "hour" => Ok(Field::Hour),
            other => Err(AnalysisError::MissingField(other.to_string())),
        }
    }
}

/// Descriptive statistics over one field. Undefined values are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// One partition produced by a group-by.
#[derive(Debug, Clone, PartialEq)]
pub struct Group<K> {
    pub key: K,
    /// Number of records in the group.
    pub count: usize,
    pub stats: BTreeMap<Field, DescriptiveStats>,
    /// Most frequent congestion level in the group.
    pub dominant_congestion: Option<CongestionLevel>,
}

impl<K> Group<K> {
    /// Statistics for a field, if it was requested.
    pub fn field(&self, field: Field) -> Option<&DescriptiveStats> {
        self.stats.get(&field)
    }
}

/// Groups in first-seen key order.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary<K> {
    pub groups: Vec<Group<K>>,
}

impl<K: PartialEq> GroupSummary<K> {
    pub fn get(&self, key: &K) -> Option<&Group<K>> {
        self.groups.iter().find(|g| &g.key == key)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Sum of group record counts.
    pub fn total_count(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group<K>> {
        self.groups.iter()
    }
}

/// Pairwise Pearson correlations. Undefined entries are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub fields: Vec<Field>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Correlation between two fields, `None` if either was not computed.
    pub fn get(&self, a: Field, b: Field) -> Option<f64> {
        let i = self.fields.iter().position(|f| *f == a)?;
        let j = self.fields.iter().position(|f| *f == b)?;
        Some(self.values[i][j])
    }
}

impl Serialize for CorrelationMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // A repeated field would produce duplicate map keys; emit its first row only.
        let rows: Vec<(usize, &Field)> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(i, f)| self.fields.iter().position(|g| g == *f) == Some(*i))
            .collect();

        let mut outer = serializer.serialize_map(Some(rows.len()))?;
        for (i, row_field) in rows {
            let row: BTreeMap<&str, Option<f64>> = self
                .fields
                .iter()
                .enumerate()
                .map(|(j, col)| {
                    let v = self.values[i][j];
                    (col.name(), (!v.is_nan()).then_some(v))
                })
                .collect();
            outer.serialize_entry(row_field.name(), &row)?;
        }
        outer.end()
    }
}

/// Observation window of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Top-level facts about the dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_records: usize,
    pub date_range: DateRange,
    /// Distinct locations in first-seen order.
    pub locations: Vec<String>,
    /// Distinct road types in first-seen order.
    pub road_types: Vec<String>,
}

/// Exported statistics for one field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStatistics {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl From<DescriptiveStats> for FieldStatistics {
    fn from(stats: DescriptiveStats) -> Self {
        Self {
            mean: stats.mean,
            std: stats.std,
            min: stats.min,
            max: stats.max,
        }
    }
}

/// Per-location means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationMeans {
    pub vehicle_count: Option<f64>,
    pub avg_speed_kmh: Option<f64>,
}

/// The exported summary report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub summary: DatasetSummary,
    pub statistics: BTreeMap<String, FieldStatistics>,
    pub by_location: BTreeMap<String, LocationMeans>,
    pub congestion_distribution: BTreeMap<String, usize>,
}

/// Everything the Markdown report renders.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub report: SummaryReport,
    pub by_location: GroupSummary<String>,
    pub by_hour: GroupSummary<u32>,
    pub by_congestion: GroupSummary<CongestionLevel>,
    /// Per-timestamp means, oldest first.
    pub by_timestamp: GroupSummary<NaiveDateTime>,
    pub correlation: CorrelationMatrix,
}
