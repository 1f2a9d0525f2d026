//! Flowstat - traffic-sensor dataset analyzer
//!
//! A CLI tool that loads a traffic dataset, computes descriptive,
//! grouped and correlation statistics, and exports a JSON summary
//! plus an optional Markdown report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Any error (invalid input, empty dataset when required, I/O failure)

use anyhow::{Context, Result};
use flowstat::cli::Args;
use flowstat::config::{self, Config};
use flowstat::loader::{self, LoadOptions};
use flowstat::models::{Field, SummaryReport};
use flowstat::{analysis, report};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        if let Err(e) = handle_init_config() {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    init_logging(&args);

    info!("Flowstat v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args) {
        error!("Analysis failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Handle --init-config: generate a default .flowstat.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::CONFIG_FILE_NAME);

    if path.exists() {
        anyhow::bail!(
            "{} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE_NAME
        );
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE_NAME);
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to set tracing subscriber: {}", e);
    }
}

/// Load, analyze, and write every output. Nothing is written unless all steps succeed.
fn run(args: Args) -> Result<()> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    let correlation_fields = Field::parse_list(&config.analysis.correlation_fields)
        .context("Invalid correlation field list")?;

    // Step 1: Load the dataset
    let mut options = LoadOptions::from(&config.loader);
    options.show_progress = !args.quiet;

    if !args.quiet {
        println!("📥 Loading dataset: {}", args.input.display());
    }
    let outcome = loader::load_dataset(&args.input, &options)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;

    if outcome.dropped > 0 {
        warn!(
            "Dropped {} rows with unparseable timestamps",
            outcome.dropped
        );
    }
    let records = outcome.records;

    // Step 2: Aggregate
    let summary = analysis::summarize(&records, config.analysis.require_non_empty)?;
    let json = report::generate_json_report(&summary)?;

    let markdown = match config.general.report {
        Some(ref path) => {
            let analysis = analysis::analyze(&records, &correlation_fields)?;
            let content = report::generate_markdown_report(&analysis, &config.chart);
            Some((PathBuf::from(path), content))
        }
        None => None,
    };

    // Step 3: Write outputs
    let output_path = PathBuf::from(&config.general.output);
    let mut outputs = vec![(output_path.as_path(), json.as_str())];
    if let Some((ref path, ref content)) = markdown {
        outputs.push((path.as_path(), content.as_str()));
    }
    report::write_outputs(&outputs)?;

    info!("Summary written to {}", output_path.display());
    if let Some((ref path, _)) = markdown {
        info!("Markdown report written to {}", path.display());
    }

    if !args.quiet {
        print_summary(&summary, start_time.elapsed().as_secs_f64());
        println!("\n✅ Summary saved to: {}", output_path.display());
        if let Some((ref path, _)) = markdown {
            println!("   Report saved to: {}", path.display());
        }
    }

    Ok(())
}

/// Print the headline numbers to stdout.
fn print_summary(summary: &SummaryReport, duration: f64) {
    let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v));

    println!("\n📊 Traffic Summary:");
    println!("   Records: {}", summary.summary.total_records);
    if let (Some(start), Some(end)) = (
        &summary.summary.date_range.start,
        &summary.summary.date_range.end,
    ) {
        println!("   Date range: {} to {}", start, end);
    }
    println!("   Locations: {}", summary.summary.locations.len());

    for field in Field::MEASURES {
        if let Some(stats) = summary.statistics.get(field.name()) {
            println!(
                "   {}: mean {} | std {} | min {} | max {}",
                field,
                fmt(stats.mean),
                fmt(stats.std),
                fmt(stats.min),
                fmt(stats.max)
            );
        }
    }

    if !summary.congestion_distribution.is_empty() {
        let levels: Vec<String> = summary
            .congestion_distribution
            .iter()
            .map(|(level, count)| format!("{}: {}", level, count))
            .collect();
        println!("   Congestion: {}", levels.join(" | "));
    }

    println!("   Duration: {:.2}s", duration);
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
