//! Traffic record aggregation and statistics.
//!
//! This module computes descriptive statistics, grouped summaries and
//! correlations over an in-memory dataset, and assembles them into the
//! exported summary report. Every function here is pure: it only reads the
//! records it is given.

use crate::analysis::stats::{CoMomentAccumulator, ModeCounter, MomentAccumulator};
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{
    Analysis, CongestionLevel, CorrelationMatrix, DatasetSummary, DateRange, DescriptiveStats,
    Field, FieldStatistics, Group, GroupSummary, LocationMeans, SummaryReport, TrafficRecord,
    TIMESTAMP_FORMAT,
};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Describe one field over all records.
pub fn describe(records: &[TrafficRecord], field: Field) -> DescriptiveStats {
    let mut acc = MomentAccumulator::new();
    for record in records {
        if let Some(value) = field.value(record) {
            acc.push(value);
        }
    }
    acc.finish()
}

/// Describe a field given by name.
pub fn describe_named(records: &[TrafficRecord], name: &str) -> AnalysisResult<DescriptiveStats> {
    let field: Field = name.parse()?;
    Ok(describe(records, field))
}

/// Partition records by `key_fn` and describe `value_fields` within each group.
///
/// Groups come back in the order their key was first seen. A key function
/// returning `None` for any record fails the whole call with
/// [`AnalysisError::InvalidGroupKey`].
pub fn group_by<K, F>(
    records: &[TrafficRecord],
    key_fn: F,
    value_fields: &[Field],
) -> AnalysisResult<GroupSummary<K>>
where
    K: Eq + Hash + Clone,
    F: Fn(&TrafficRecord) -> Option<K>,
{
    let keys = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            key_fn(record).ok_or_else(|| AnalysisError::InvalidGroupKey {
                index,
                reason: "key function produced no comparable key".to_string(),
            })
        })
        .collect::<AnalysisResult<Vec<K>>>()?;

    Ok(summarize_groups(keys.into_iter().zip(records), value_fields))
}

/// Group by location name.
pub fn by_location(records: &[TrafficRecord], value_fields: &[Field]) -> GroupSummary<String> {
    summarize_groups(
        records.iter().map(|r| (r.location.clone(), r)),
        value_fields,
    )
}

/// Group by hour of day (0-23).
pub fn by_hour(records: &[TrafficRecord], value_fields: &[Field]) -> GroupSummary<u32> {
    summarize_groups(records.iter().map(|r| (r.hour(), r)), value_fields)
}

/// Group by congestion level.
pub fn by_congestion(
    records: &[TrafficRecord],
    value_fields: &[Field],
) -> GroupSummary<CongestionLevel> {
    summarize_groups(
        records.iter().map(|r| (r.congestion_level, r)),
        value_fields,
    )
}

/// Group by exact timestamp, in chronological order.
pub fn by_timestamp(
    records: &[TrafficRecord],
    value_fields: &[Field],
) -> GroupSummary<NaiveDateTime> {
    let mut summary = summarize_groups(records.iter().map(|r| (r.timestamp, r)), value_fields);
    summary.groups.sort_by_key(|g| g.key);
    summary
}

struct GroupState<K> {
    key: K,
    count: usize,
    moments: Vec<MomentAccumulator>,
    congestion: ModeCounter<CongestionLevel>,
}

fn summarize_groups<'a, K, I>(keyed: I, value_fields: &[Field]) -> GroupSummary<K>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = (K, &'a TrafficRecord)>,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut states: Vec<GroupState<K>> = Vec::new();

    for (key, record) in keyed {
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            states.push(GroupState {
                key,
                count: 0,
                moments: vec![MomentAccumulator::new(); value_fields.len()],
                congestion: ModeCounter::new(),
            });
            states.len() - 1
        });

        let state = &mut states[slot];
        state.count += 1;
        state.congestion.push(record.congestion_level);
        for (acc, field) in state.moments.iter_mut().zip(value_fields) {
            if let Some(value) = field.value(record) {
                acc.push(value);
            }
        }
    }

    let groups = states
        .into_iter()
        .map(|state| Group {
            key: state.key,
            count: state.count,
            stats: value_fields
                .iter()
                .copied()
                .zip(state.moments.iter().map(MomentAccumulator::finish))
                .collect(),
            dominant_congestion: state.congestion.mode(),
        })
        .collect();

    GroupSummary { groups }
}

/// Pearson correlation for every pair of `fields`.
///
/// Congestion is ordinal-encoded. A field paired with itself is exactly 1.0
/// when it has at least two values and non-zero variance; pairs involving a
/// constant field are NaN.
pub fn correlate(records: &[TrafficRecord], fields: &[Field]) -> AnalysisResult<CorrelationMatrix> {
    if records.is_empty() {
        return Err(AnalysisError::EmptyDataset {
            operation: "correlate",
        });
    }

    let n = fields.len();
    let mut values = vec![vec![f64::NAN; n]; n];

    for i in 0..n {
        for j in i..n {
            let r = if fields[i] == fields[j] {
                let mut acc = MomentAccumulator::new();
                for record in records {
                    if let Some(v) = fields[i].value(record) {
                        acc.push(v);
                    }
                }
                match acc.variance() {
                    Some(var) if var > 0.0 => 1.0,
                    _ => f64::NAN,
                }
            } else {
                let mut acc = CoMomentAccumulator::new();
                for record in records {
                    if let (Some(x), Some(y)) = (fields[i].value(record), fields[j].value(record)) {
                        acc.push(x, y);
                    }
                }
                acc.pearson()
            };
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    Ok(CorrelationMatrix {
        fields: fields.to_vec(),
        values,
    })
}

/// Build the exported summary report.
pub fn build_report(records: &[TrafficRecord]) -> SummaryReport {
    let mut locations = ModeCounter::new();
    let mut road_types = ModeCounter::new();
    let mut congestion = ModeCounter::new();

    for record in records {
        locations.push(record.location.as_str());
        road_types.push(record.road_type.as_str());
        congestion.push(record.congestion_level);
    }

    let date_range = DateRange {
        start: records
            .iter()
            .map(|r| r.timestamp)
            .min()
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
        end: records
            .iter()
            .map(|r| r.timestamp)
            .max()
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
    };

    let statistics = Field::MEASURES
        .iter()
        .map(|f| (f.name().to_string(), FieldStatistics::from(describe(records, *f))))
        .collect();

    let by_location = by_location(records, &Field::MEASURES)
        .groups
        .into_iter()
        .map(|g| {
            let means = LocationMeans {
                vehicle_count: g.field(Field::VehicleCount).and_then(|s| s.mean),
                avg_speed_kmh: g.field(Field::AvgSpeedKmh).and_then(|s| s.mean),
            };
            (g.key, means)
        })
        .collect();

    let congestion_distribution = congestion
        .counts()
        .iter()
        .map(|(level, count)| (level.to_string(), *count))
        .collect::<BTreeMap<_, _>>();

    SummaryReport {
        summary: DatasetSummary {
            total_records: records.len(),
            date_range,
            locations: distinct(&locations),
            road_types: distinct(&road_types),
        },
        statistics,
        by_location,
        congestion_distribution,
    }
}

fn distinct(counter: &ModeCounter<&str>) -> Vec<String> {
    counter.counts().iter().map(|(v, _)| v.to_string()).collect()
}

/// Build the report, failing on an empty dataset when the caller requires output.
pub fn summarize(records: &[TrafficRecord], require_non_empty: bool) -> AnalysisResult<SummaryReport> {
    if require_non_empty && records.is_empty() {
        return Err(AnalysisError::EmptyDataset {
            operation: "summarize",
        });
    }
    Ok(build_report(records))
}

/// Run every analysis the Markdown report needs.
pub fn analyze(records: &[TrafficRecord], correlation_fields: &[Field]) -> AnalysisResult<Analysis> {
    let correlation_fields = Field::unique(correlation_fields);
    let correlation = if records.is_empty() {
        let n = correlation_fields.len();
        CorrelationMatrix {
            fields: correlation_fields,
            values: vec![vec![f64::NAN; n]; n],
        }
    } else {
        correlate(records, &correlation_fields)?
    };

    Ok(Analysis {
        report: build_report(records),
        by_location: by_location(records, &Field::MEASURES),
        by_hour: by_hour(records, &Field::MEASURES),
        by_congestion: by_congestion(records, &Field::MEASURES),
        by_timestamp: by_timestamp(records, &Field::MEASURES),
        correlation,
    })
}

/// Groups ordered by the mean of `field`, highest first.
pub fn rank_by_mean<K>(summary: &GroupSummary<K>, field: Field) -> Vec<(&Group<K>, f64)> {
    let mut ranked: Vec<_> = summary
        .groups
        .iter()
        .filter_map(|g| g.field(field).and_then(|s| s.mean).map(|m| (g, m)))
        .collect();

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn create_test_record(
        location: &str,
        vehicle_count: u64,
        avg_speed_kmh: f64,
        level: CongestionLevel,
    ) -> TrafficRecord {
        TrafficRecord {
            timestamp: ts(8),
            location: location.to_string(),
            road_type: "Highway".to_string(),
            vehicle_count,
            avg_speed_kmh,
            congestion_level: level,
        }
    }

    fn scenario() -> Vec<TrafficRecord> {
        vec![
            create_test_record("A", 10, 50.0, CongestionLevel::Low),
            create_test_record("A", 20, 30.0, CongestionLevel::High),
            create_test_record("B", 15, 40.0, CongestionLevel::Medium),
        ]
    }

    #[test]
    fn test_describe_bounds() {
        let records = scenario();
        for field in Field::ALL {
            let stats = describe(&records, field);
            assert_eq!(stats.count, 3);
            assert!(stats.min.unwrap() <= stats.mean.unwrap());
            assert!(stats.mean.unwrap() <= stats.max.unwrap());
        }
    }

    #[test]
    fn test_describe_sample_std() {
        let stats = describe(&scenario(), Field::VehicleCount);
        assert_eq!(stats.mean, Some(15.0));
        assert!((stats.std.unwrap() - 5.0).abs() < 1e-12);
        assert_eq!(stats.min, Some(10.0));
        assert_eq!(stats.max, Some(20.0));
    }

    #[test]
    fn test_describe_single_record() {
        let records = vec![create_test_record("A", 42, 61.5, CongestionLevel::Low)];
        let stats = describe(&records, Field::AvgSpeedKmh);
        assert_eq!(stats.mean, Some(61.5));
        assert_eq!(stats.min, Some(61.5));
        assert_eq!(stats.max, Some(61.5));
        assert!(stats.std.is_none());
    }

    #[test]
    fn test_describe_empty() {
        let stats = describe(&[], Field::VehicleCount);
        assert_eq!(stats.count, 0);
        assert!(stats.mean.is_none());
        assert!(stats.std.is_none());
    }

    #[test]
    fn test_describe_named_unknown_field() {
        let err = describe_named(&scenario(), "occupancy").unwrap_err();
        assert_eq!(err, AnalysisError::MissingField("occupancy".to_string()));
        assert!(describe_named(&scenario(), "avg_speed_kmh").is_ok());
    }

    #[test]
    fn test_group_by_partitions_exhaustive_and_disjoint() {
        let mut records = scenario();
        records.push(create_test_record("C", 5, 70.0, CongestionLevel::Low));
        records.push(create_test_record("B", 25, 20.0, CongestionLevel::High));

        let grouped = group_by(&records, |r| Some(r.location.clone()), &[Field::VehicleCount]).unwrap();

        assert_eq!(grouped.total_count(), records.len());
        let keys: Vec<_> = grouped.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
        assert_eq!(grouped.get(&"B".to_string()).map(|g| g.count), Some(2));
    }

    #[test]
    fn test_group_by_dominant_congestion_tie_breaks_first_seen() {
        let records = scenario();
        let grouped = group_by(&records, |r| Some(r.location.clone()), &[]).unwrap();

        let a = grouped.get(&"A".to_string()).unwrap();
        assert_eq!(a.dominant_congestion, Some(CongestionLevel::Low));
        assert!(a.stats.is_empty());
    }

    #[test]
    fn test_group_by_invalid_key() {
        let records = scenario();
        let err = group_by(
            &records,
            |r| (r.location != "B").then(|| r.location.clone()),
            &[Field::VehicleCount],
        )
        .unwrap_err();

        assert_eq!(
            err,
            AnalysisError::InvalidGroupKey {
                index: 2,
                reason: "key function produced no comparable key".to_string(),
            }
        );
    }

    #[test]
    fn test_by_hour_and_congestion() {
        let mut records = scenario();
        records[2].timestamp = ts(17);

        let hours = by_hour(&records, &Field::MEASURES);
        assert_eq!(hours.len(), 2);
        assert_eq!(
            hours.get(&8).and_then(|g| g.field(Field::VehicleCount)).and_then(|s| s.mean),
            Some(15.0)
        );

        let levels = by_congestion(&records, &Field::MEASURES);
        assert_eq!(levels.len(), 3);
        assert_eq!(
            levels
                .get(&CongestionLevel::High)
                .and_then(|g| g.field(Field::AvgSpeedKmh))
                .and_then(|s| s.min),
            Some(30.0)
        );
    }

    #[test]
    fn test_correlate_self_is_one() {
        let records = scenario();
        for field in Field::CORRELATED {
            let matrix = correlate(&records, &[field, field]).unwrap();
            assert_eq!(matrix.values[0][1], 1.0);
            assert_eq!(matrix.values[0][0], 1.0);
        }
    }

    #[test]
    fn test_correlate_symmetric_and_bounded() {
        let matrix = correlate(&scenario(), &Field::CORRELATED).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let v = matrix.values[i][j];
                assert_eq!(v, matrix.values[j][i]);
                assert!((-1.0..=1.0).contains(&v));
            }
        }
        // speed falls exactly as count rises in the scenario
        let r = matrix.get(Field::VehicleCount, Field::AvgSpeedKmh).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_correlate_constant_field_is_nan() {
        let records = scenario();
        let matrix = correlate(&records, &[Field::Hour, Field::VehicleCount]).unwrap();
        assert!(matrix.get(Field::Hour, Field::Hour).unwrap().is_nan());
        assert!(matrix.get(Field::Hour, Field::VehicleCount).unwrap().is_nan());
        assert_eq!(matrix.get(Field::VehicleCount, Field::VehicleCount), Some(1.0));
    }

    #[test]
    fn test_correlate_empty() {
        let err = correlate(&[], &Field::CORRELATED).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyDataset { .. }));
    }

    #[test]
    fn test_build_report_scenario() {
        let report = build_report(&scenario());

        assert_eq!(report.summary.total_records, 3);
        assert_eq!(report.summary.locations, vec!["A", "B"]);
        assert_eq!(report.summary.road_types, vec!["Highway"]);
        assert_eq!(report.statistics["vehicle_count"].mean, Some(15.0));
        assert_eq!(report.by_location["A"].vehicle_count, Some(15.0));
        assert_eq!(report.by_location["A"].avg_speed_kmh, Some(40.0));

        let expected: BTreeMap<String, usize> = [("Low", 1), ("High", 1), ("Medium", 1)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(report.congestion_distribution, expected);
    }

    #[test]
    fn test_build_report_date_range() {
        let mut records = scenario();
        records[0].timestamp = ts(23);
        records[1].timestamp = ts(3);

        let report = build_report(&records);
        assert_eq!(report.summary.date_range.start.as_deref(), Some("2024-01-15 03:00:00"));
        assert_eq!(report.summary.date_range.end.as_deref(), Some("2024-01-15 23:00:00"));
    }

    #[test]
    fn test_build_report_empty() {
        let report = build_report(&[]);

        assert_eq!(report.summary.total_records, 0);
        assert!(report.summary.date_range.start.is_none());
        assert!(report.summary.locations.is_empty());
        assert!(report.by_location.is_empty());
        assert!(report.congestion_distribution.is_empty());
        for field in Field::MEASURES {
            let stats = report.statistics[field.name()];
            assert!(stats.mean.is_none());
            assert!(stats.std.is_none());
        }

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["total_records"], 0);
        assert!(json["statistics"]["vehicle_count"]["mean"].is_null());
    }

    #[test]
    fn test_build_report_json_round_trip() {
        let mut records = scenario();
        records.push(create_test_record("C", 7, 88.8, CongestionLevel::Low));
        let report = build_report(&records);

        let json = serde_json::to_string(&report).unwrap();
        let back: SummaryReport = serde_json::from_str(&json).unwrap();

        assert_eq!(back.summary, report.summary);
        assert_eq!(back.congestion_distribution, report.congestion_distribution);
        for (name, stats) in &report.statistics {
            let other = back.statistics[name];
            for (a, b) in [
                (stats.mean, other.mean),
                (stats.std, other.std),
                (stats.min, other.min),
                (stats.max, other.max),
            ] {
                assert!((a.unwrap() - b.unwrap()).abs() < 1e-9);
            }
        }
        for (location, means) in &report.by_location {
            let other = back.by_location[location];
            assert!((means.vehicle_count.unwrap() - other.vehicle_count.unwrap()).abs() < 1e-9);
            assert!((means.avg_speed_kmh.unwrap() - other.avg_speed_kmh.unwrap()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_summarize_require_non_empty() {
        assert!(matches!(
            summarize(&[], true),
            Err(AnalysisError::EmptyDataset { operation: "summarize" })
        ));
        assert_eq!(summarize(&[], false).unwrap().summary.total_records, 0);
        assert_eq!(summarize(&scenario(), true).unwrap().summary.total_records, 3);
    }

    #[test]
    fn test_by_timestamp_is_chronological() {
        let mut records = scenario();
        records[0].timestamp = ts(18);
        records[1].timestamp = ts(6);
        records[2].timestamp = ts(18);

        let series = by_timestamp(&records, &Field::MEASURES);
        let keys: Vec<NaiveDateTime> = series.iter().map(|g| g.key).collect();
        assert_eq!(keys, vec![ts(6), ts(18)]);

        let evening = series.get(&ts(18)).unwrap();
        assert_eq!(evening.count, 2);
        assert_eq!(
            evening.field(Field::VehicleCount).and_then(|s| s.mean),
            Some(12.5)
        );
        assert_eq!(series.total_count(), records.len());
    }

    #[test]
    fn test_analyze_dedups_correlation_fields() {
        let analysis = analyze(
            &scenario(),
            &[Field::VehicleCount, Field::AvgSpeedKmh, Field::VehicleCount],
        )
        .unwrap();
        assert_eq!(
            analysis.correlation.fields,
            vec![Field::VehicleCount, Field::AvgSpeedKmh]
        );
    }

    #[test]
    fn test_analyze_empty_dataset() {
        let analysis = analyze(&[], &Field::CORRELATED).unwrap();
        assert!(analysis.by_location.is_empty());
        assert!(analysis.by_timestamp.is_empty());
        assert_eq!(analysis.correlation.fields.len(), 3);
        assert!(analysis.correlation.values[0][0].is_nan());
    }

    #[test]
    fn test_rank_by_mean() {
        let grouped = by_location(&scenario(), &Field::MEASURES);
        let ranked = rank_by_mean(&grouped, Field::VehicleCount);
        // A and B both average 15; stable sort keeps first-seen order
        assert_eq!(ranked[0].0.key, "A");
        assert_eq!(ranked[1].0.key, "B");

        let ranked = rank_by_mean(&grouped, Field::AvgSpeedKmh);
        assert_eq!(ranked[0].0.key, "A");
        assert_eq!(ranked[0].1, 40.0);
    }
}
