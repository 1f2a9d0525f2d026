//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.flowstat.toml` files.

use crate::loader::{InputFormat, TimestampPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".flowstat.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Input settings.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Chart rendering settings.
    #[serde(default)]
    pub chart: ChartConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// JSON summary output path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Markdown report output path (no report when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            report: None,
        }
    }
}

fn default_output() -> String {
    "traffic_flow_summary.json".to_string()
}

/// Input decoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Force an input format instead of inferring it from the extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<InputFormat>,

    /// CSV lines starting with this character are ignored.
    #[serde(default = "default_comment_char")]
    pub comment_char: Option<String>,

    /// Policy for rows whose timestamp cannot be parsed.
    #[serde(default)]
    pub invalid_timestamps: TimestampPolicy,

    /// Naive timestamp layouts (chrono syntax), tried after RFC 3339.
    #[serde(default = "default_timestamp_formats")]
    pub timestamp_formats: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            format: None,
            comment_char: default_comment_char(),
            invalid_timestamps: TimestampPolicy::default(),
            timestamp_formats: default_timestamp_formats(),
        }
    }
}

fn default_comment_char() -> Option<String> {
    Some("#".to_string())
}

impl LoaderConfig {
    /// The comment marker as the single byte the CSV reader expects.
    ///
    /// An empty string disables comment handling.
    pub fn comment_byte(&self) -> Result<Option<u8>> {
        let Some(ref c) = self.comment_char else {
            return Ok(None);
        };
        match c.as_bytes() {
            [] => Ok(None),
            [b] if b.is_ascii() => Ok(Some(*b)),
            _ => anyhow::bail!("comment_char must be a single ASCII character, got {:?}", c),
        }
    }
}

fn default_timestamp_formats() -> Vec<String> {
    vec!["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Fail instead of writing an empty report.
    #[serde(default)]
    pub require_non_empty: bool,

    /// Fields included in the correlation matrix.
    #[serde(default = "default_correlation_fields")]
    pub correlation_fields: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            require_non_empty: false,
            correlation_fields: default_correlation_fields(),
        }
    }
}

fn default_correlation_fields() -> Vec<String> {
    vec!["vehicle_count", "avg_speed_kmh", "congestion_level"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Presentation settings handed to the report renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Width in characters of the longest bar.
    #[serde(default = "default_bar_width")]
    pub bar_width: usize,

    /// Character used to draw bars.
    #[serde(default = "default_bar_char")]
    pub bar_char: char,

    /// Decimal places for rounded values.
    #[serde(default = "default_decimals")]
    pub decimals: usize,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            bar_width: default_bar_width(),
            bar_char: default_bar_char(),
            decimals: default_decimals(),
        }
    }
}

fn default_bar_width() -> usize {
    40
}

fn default_bar_char() -> char {
    '#'
}

fn default_decimals() -> usize {
    2
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(ref report) = args.report {
            self.general.report = Some(report.display().to_string());
        }
        if args.input_format.is_some() {
            self.loader.format = args.input_format;
        }
        if args.drop_invalid_timestamps {
            self.loader.invalid_timestamps = TimestampPolicy::Drop;
        }

        if args.require_non_empty {
            self.analysis.require_non_empty = true;
        }
        if let Some(ref fields) = args.fields {
            self.analysis.correlation_fields = fields.clone();
        }
    }

    /// Check settings that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<()> {
        self.loader
            .comment_byte()
            .context("Invalid [loader] settings")?;
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::tests::make_args;
    use std::path::PathBuf;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.output, "traffic_flow_summary.json");
        assert_eq!(config.loader.comment_char.as_deref(), Some("#"));
        assert_eq!(config.loader.invalid_timestamps, TimestampPolicy::Reject);
        assert!(config
            .analysis
            .correlation_fields
            .contains(&"congestion_level".to_string()));
        assert_eq!(config.chart.bar_width, 40);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "out/summary.json"
report = "out/report.md"

[loader]
format = "json"
invalid_timestamps = "drop"

[analysis]
require_non_empty = true
correlation_fields = ["vehicle_count", "hour"]

[chart]
bar_char = "*"
decimals = 1
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "out/summary.json");
        assert_eq!(config.general.report.as_deref(), Some("out/report.md"));
        assert_eq!(config.loader.format, Some(InputFormat::Json));
        assert_eq!(config.loader.invalid_timestamps, TimestampPolicy::Drop);
        assert_eq!(config.loader.timestamp_formats.len(), 3);
        assert!(config.analysis.require_non_empty);
        assert_eq!(config.analysis.correlation_fields, vec!["vehicle_count", "hour"]);
        assert_eq!(config.chart.bar_char, '*');
        assert_eq!(config.chart.decimals, 1);
        assert_eq!(config.chart.bar_width, 40);
    }

    #[test]
    fn test_merge_with_args_only_overrides_explicit() {
        let mut config = Config::default();
        config.general.report = Some("kept.md".to_string());

        let args = make_args();
        config.merge_with_args(&args);
        assert_eq!(config.general.output, "traffic_flow_summary.json");
        assert_eq!(config.general.report.as_deref(), Some("kept.md"));
        assert_eq!(config.loader.invalid_timestamps, TimestampPolicy::Reject);

        let mut args = make_args();
        args.output = Some(PathBuf::from("custom.json"));
        args.drop_invalid_timestamps = true;
        args.fields = Some(vec!["hour".to_string()]);
        config.merge_with_args(&args);
        assert_eq!(config.general.output, "custom.json");
        assert_eq!(config.loader.invalid_timestamps, TimestampPolicy::Drop);
        assert_eq!(config.analysis.correlation_fields, vec!["hour"]);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[loader]"));
        assert!(toml_str.contains("[chart]"));

        assert!(!toml_str.contains("verbose"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.chart, ChartConfig::default());
    }

    #[test]
    fn test_comment_char_must_be_single_ascii() {
        let mut config = Config::default();
        assert_eq!(config.loader.comment_byte().unwrap(), Some(b'#'));
        assert!(config.validate().is_ok());

        config.loader.comment_char = Some(String::new());
        assert_eq!(config.loader.comment_byte().unwrap(), None);

        config.loader.comment_char = None;
        assert_eq!(config.loader.comment_byte().unwrap(), None);

        for bad in ["§", "##"] {
            config.loader.comment_char = Some(bad.to_string());
            assert!(config.loader.comment_byte().is_err(), "{bad}");
            assert!(config.validate().is_err(), "{bad}");
        }
    }
}
