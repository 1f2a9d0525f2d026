//! JSON and Markdown report generation.
//!
//! The JSON summary is the exported artifact; the Markdown report renders
//! the full analysis with text bar charts styled by a [`ChartConfig`].

use crate::analysis::rank_by_mean;
use crate::config::ChartConfig;
use crate::models::{
    Analysis, CongestionLevel, CorrelationMatrix, DatasetSummary, Field, FieldStatistics, Group,
    GroupSummary, SummaryReport, TIMESTAMP_FORMAT,
};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Generate the JSON summary.
pub fn generate_json_report(report: &SummaryReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write rendered outputs, creating parent directories. All or nothing.
///
/// Each file is first staged as a temporary file next to its destination.
/// Destinations are only replaced once every file has been staged, so a
/// failure while preparing any output leaves none of them on disk.
pub fn write_outputs(outputs: &[(&Path, &str)]) -> Result<()> {
    let mut staged = Vec::with_capacity(outputs.len());

    for &(path, content) in outputs {
        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
                parent
            }
            None => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to stage report for {}", path.display()))?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.flush())
            .with_context(|| format!("Failed to write report to {}", path.display()))?;

        staged.push((file, path));
    }

    for (file, path) in staged {
        file.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        debug!("Wrote {}", path.display());
    }

    Ok(())
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(analysis: &Analysis, chart: &ChartConfig) -> String {
    let mut output = String::new();

    output.push_str("# Traffic Flow Analysis Report\n\n");
    output.push_str(&generate_summary_section(&analysis.report.summary));
    output.push_str(&generate_statistics_section(&analysis.report.statistics, chart));
    output.push_str(&generate_distribution_section(
        &analysis.report.congestion_distribution,
        chart,
    ));
    output.push_str(&generate_location_section(&analysis.by_location, chart));
    output.push_str(&generate_time_section(&analysis.by_hour, chart));
    output.push_str(&generate_series_section(&analysis.by_timestamp, chart));
    output.push_str(&generate_congestion_section(&analysis.by_congestion, chart));
    output.push_str(&generate_correlation_section(&analysis.correlation, chart));
    output.push_str(&generate_footer());

    output
}

fn generate_summary_section(summary: &DatasetSummary) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(&format!("- **Total Records:** {}\n", summary.total_records));

    match (&summary.date_range.start, &summary.date_range.end) {
        (Some(start), Some(end)) => {
            section.push_str(&format!("- **Date Range:** {} to {}\n", start, end))
        }
        _ => section.push_str("- **Date Range:** n/a\n"),
    }

    section.push_str(&format!("- **Locations:** {}\n", join_or_none(&summary.locations)));
    section.push_str(&format!("- **Road Types:** {}\n", join_or_none(&summary.road_types)));
    section.push('\n');

    section
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "none".to_string()
    } else {
        values.join(", ")
    }
}

fn generate_statistics_section(
    statistics: &BTreeMap<String, FieldStatistics>,
    chart: &ChartConfig,
) -> String {
    let mut section = String::new();

    section.push_str("## Numerical Statistics\n\n");
    section.push_str("| Field | Mean | Std | Min | Max |\n");
    section.push_str("|:---|---:|---:|---:|---:|\n");

    for field in Field::MEASURES {
        let stats = statistics.get(field.name()).copied().unwrap_or_default();
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            field,
            fmt_value(stats.mean, chart),
            fmt_value(stats.std, chart),
            fmt_value(stats.min, chart),
            fmt_value(stats.max, chart),
        ));
    }
    section.push('\n');

    section
}

fn generate_distribution_section(distribution: &BTreeMap<String, usize>, chart: &ChartConfig) -> String {
    let mut section = String::new();

    section.push_str("## Congestion Level Distribution\n\n");

    let total: usize = distribution.values().sum();
    if total == 0 {
        section.push_str("_No records._\n\n");
        return section;
    }

    let max = distribution.values().copied().max().unwrap_or(0) as f64;

    section.push_str("| Level | Records | Share |\n");
    section.push_str("|:---|---:|---:|\n");

    let mut bars = Vec::new();
    for level in CongestionLevel::ALL {
        let count = distribution.get(level.as_str()).copied().unwrap_or(0);
        let share = count as f64 / total as f64 * 100.0;
        section.push_str(&format!("| {} | {} | {:.1}% |\n", level, count, share));
        bars.push((level.to_string(), count as f64));
    }
    section.push('\n');
    section.push_str(&render_bar_chart(&bars, max, chart));

    section
}

fn generate_location_section(by_location: &GroupSummary<String>, chart: &ChartConfig) -> String {
    let mut section = String::new();

    section.push_str("## Analysis by Location\n\n");

    if by_location.is_empty() {
        section.push_str("_No records._\n\n");
        return section;
    }

    section.push_str(
        "| Location | Records | Vehicles Mean | Vehicles Max | Vehicles Min | Vehicles Std \
         | Speed Mean | Speed Max | Speed Min | Speed Std | Dominant Congestion |\n",
    );
    section.push_str("|:---|---:|---:|---:|---:|---:|---:|---:|---:|---:|:---:|\n");

    for group in by_location.iter() {
        let vehicles = stats_of(group, Field::VehicleCount);
        let speed = stats_of(group, Field::AvgSpeedKmh);
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |\n",
            group.key,
            group.count,
            fmt_value(vehicles.mean, chart),
            fmt_value(vehicles.max, chart),
            fmt_value(vehicles.min, chart),
            fmt_value(vehicles.std, chart),
            fmt_value(speed.mean, chart),
            fmt_value(speed.max, chart),
            fmt_value(speed.min, chart),
            fmt_value(speed.std, chart),
            group
                .dominant_congestion
                .map(|c| c.to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
        ));
    }
    section.push('\n');

    let ranked = rank_by_mean(by_location, Field::VehicleCount);
    let max = ranked.first().map(|(_, m)| *m).unwrap_or(0.0);
    let bars: Vec<(String, f64)> = ranked
        .into_iter()
        .map(|(g, m)| (g.key.clone(), m))
        .collect();

    section.push_str("### Average Vehicle Count by Location\n\n");
    section.push_str(&render_bar_chart(&bars, max, chart));

    section
}

fn generate_time_section(by_hour: &GroupSummary<u32>, chart: &ChartConfig) -> String {
    let mut section = String::new();

    section.push_str("## Analysis by Time of Day\n\n");

    if by_hour.is_empty() {
        section.push_str("_No records._\n\n");
        return section;
    }

    let mut groups: Vec<&Group<u32>> = by_hour.iter().collect();
    groups.sort_by_key(|g| g.key);

    section.push_str("| Hour | Records | Vehicles Mean | Speed Mean |\n");
    section.push_str("|---:|---:|---:|---:|\n");

    let mut bars = Vec::new();
    for group in &groups {
        let vehicles = stats_of(group, Field::VehicleCount);
        let speed = stats_of(group, Field::AvgSpeedKmh);
        section.push_str(&format!(
            "| {:02}:00 | {} | {} | {} |\n",
            group.key,
            group.count,
            fmt_value(vehicles.mean, chart),
            fmt_value(speed.mean, chart),
        ));
        if let Some(mean) = vehicles.mean {
            bars.push((format!("{:02}:00", group.key), mean));
        }
    }
    section.push('\n');

    let max = bars.iter().map(|(_, v)| *v).fold(0.0, f64::max);
    section.push_str("### Vehicle Count by Hour\n\n");
    section.push_str(&render_bar_chart(&bars, max, chart));

    section
}

fn generate_series_section(
    by_timestamp: &GroupSummary<NaiveDateTime>,
    chart: &ChartConfig,
) -> String {
    let mut section = String::new();

    section.push_str("## Traffic Over Time

");

    if by_timestamp.is_empty() {
        section.push_str("_No records._

");
        return section;
    }

    section.push_str("| Timestamp | Records | Vehicles Mean | Speed Mean |\n");
    section.push_str("|:---|---:|---:|---:|\n");

    let mut vehicle_bars = Vec::new();
    let mut speed_bars = Vec::new();
    for group in by_timestamp.iter() {
        let label = group.key.format(TIMESTAMP_FORMAT).to_string();
        let vehicles = stats_of(group, Field::VehicleCount);
        let speed = stats_of(group, Field::AvgSpeedKmh);
        section.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            label,
            group.count,
            fmt_value(vehicles.mean, chart),
            fmt_value(speed.mean, chart),
        ));
        if let Some(mean) = vehicles.mean {
            vehicle_bars.push((label.clone(), mean));
        }
        if let Some(mean) = speed.mean {
            speed_bars.push((label, mean));
        }
    }
    section.push('\n');

    let peak = |bars: &[(String, f64)]| bars.iter().map(|(_, v)| *v).fold(0.0, f64::max);

    section.push_str("### Vehicle Count Over Time\n\n");
    section.push_str(&render_bar_chart(&vehicle_bars, peak(&vehicle_bars), chart));
    section.push_str("### Average Speed Over Time\n\n");
    section.push_str(&render_bar_chart(&speed_bars, peak(&speed_bars), chart));

    section
}

fn generate_congestion_section(
    by_congestion: &GroupSummary<CongestionLevel>,
    chart: &ChartConfig,
) -> String {
    let mut section = String::new();

    section.push_str("## Congestion Pattern Analysis\n\n");

    if by_congestion.is_empty() {
        section.push_str("_No records._\n\n");
        return section;
    }

    section.push_str("| Level | Records | Vehicles Mean | Vehicles Max | Speed Mean | Speed Min |\n");
    section.push_str("|:---|---:|---:|---:|---:|---:|\n");

    for level in CongestionLevel::ALL {
        let Some(group) = by_congestion.get(&level) else {
            continue;
        };
        let vehicles = stats_of(group, Field::VehicleCount);
        let speed = stats_of(group, Field::AvgSpeedKmh);
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            level,
            group.count,
            fmt_value(vehicles.mean, chart),
            fmt_value(vehicles.max, chart),
            fmt_value(speed.mean, chart),
            fmt_value(speed.min, chart),
        ));
    }
    section.push('\n');

    section
}

fn generate_correlation_section(matrix: &CorrelationMatrix, chart: &ChartConfig) -> String {
    let mut section = String::new();

    section.push_str("## Correlation Matrix\n\n");

    if matrix.fields.is_empty() {
        section.push_str("_No fields selected._\n\n");
        return section;
    }

    section.push_str("| |");
    for field in &matrix.fields {
        section.push_str(&format!(" {} |", field));
    }
    section.push('\n');

    section.push_str("|:---|");
    section.push_str(&"---:|".repeat(matrix.fields.len()));
    section.push('\n');

    for (i, field) in matrix.fields.iter().enumerate() {
        section.push_str(&format!("| **{}** |", field));
        for value in &matrix.values[i] {
            let value = (!value.is_nan()).then_some(*value);
            section.push_str(&format!(" {} |", fmt_value(value, chart)));
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    format!(
        "---\n\n*Report generated by flowstat v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

fn stats_of<K>(group: &Group<K>, field: Field) -> FieldStatistics {
    group
        .field(field)
        .copied()
        .map(FieldStatistics::from)
        .unwrap_or_default()
}

/// Format an optional value with the configured precision.
fn fmt_value(value: Option<f64>, chart: &ChartConfig) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", chart.decimals, v),
        _ => "n/a".to_string(),
    }
}

/// Bar proportional to `value / max`, at most `chart.bar_width` long.
fn render_bar(value: f64, max: f64, chart: &ChartConfig) -> String {
    if !(max > 0.0) || !value.is_finite() || value <= 0.0 {
        return String::new();
    }
    let len = ((value / max) * chart.bar_width as f64).round() as usize;
    std::iter::repeat(chart.bar_char)
        .take(len.min(chart.bar_width))
        .collect()
}

fn render_bar_chart(rows: &[(String, f64)], max: f64, chart: &ChartConfig) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let label_width = rows.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);

    let mut block = String::from("```text\n");
    for (label, value) in rows {
        block.push_str(&format!(
            "{:<width$} | {} {}\n",
            label,
            render_bar(*value, max, chart),
            format!("{:.*}", chart.decimals, value),
            width = label_width
        ));
    }
    block.push_str("```\n\n");

    block
}
