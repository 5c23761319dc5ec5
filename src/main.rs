//! pbta-summary - per-histology summary tables for OpenPBTA results
//!
//! Joins per-sample result tables with the histology label/color table and
//! writes plot-ready group summaries plus a Markdown or JSON report. Also
//! downloads and verifies data releases.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (missing column, bad input, network failure, etc.)
//!   2 - Downloaded release failed checksum verification

mod analysis;
mod cli;
mod config;
mod models;
mod pipeline;
mod release;
mod report;
mod table;

use anyhow::{Context, Result};
use cli::{Args, Command, DownloadArgs, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use models::{Report, SummarySection};
use pipeline::ProportionRequest;
use release::{download_release, HttpFetcher, ReleaseOptions, VerifyStatus};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    // Config comes first: `general.verbose` feeds the log level.
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(args.log_level(config.general.verbose));

    info!("pbta-summary v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .pbta-summary.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize paths, dimensions, sort orders and thresholds.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch one subcommand. Returns the process exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    debug!("Effective config: {:?}", config);

    let start_time = Instant::now();
    let report = match &args.command {
        Command::Download(download) => return run_download(&config, download, args.quiet).await,
        Command::InitConfig => return Ok(0),
        Command::Proportions(p) => {
            let facts_path = config.resolve(&p.facts);
            let (facts, labels) = read_inputs(&config, &facts_path)?;
            let request = ProportionRequest {
                name: p.name.clone(),
                predicate_column: p.predicate_column.clone(),
                predicate: p.predicate.clone(),
                group_by: p.group_by.clone(),
                sort: p.sort.map(Into::into),
            };
            println!(
                "📊 Summarizing {} ({:?}) over {} samples",
                p.predicate_column,
                p.predicate,
                facts.len()
            );
            pipeline::proportions_report(
                &config,
                &facts,
                &labels,
                &request,
                input_names(&config, &facts_path),
            )?
        }
        Command::Chromothripsis(c) => {
            let calls_path = config.resolve(&c.calls);
            let (calls, labels) = read_inputs(&config, &calls_path)?;
            println!("📊 Summarizing chromothripsis calls for {} samples", calls.len());
            pipeline::chromothripsis_report(
                &config,
                &calls,
                &labels,
                input_names(&config, &calls_path),
            )?
        }
        Command::Signatures(s) => {
            let exposures_path = config.resolve(&s.exposures);
            let matrix = table::read_exposure_matrix(&exposures_path)?;
            let labels = table::read_tsv(&config.resolve(&config.labels.path))?;
            println!(
                "📊 Summarizing {} signatures for {} samples",
                matrix.columns.len().saturating_sub(1),
                matrix.len()
            );
            pipeline::signatures_report(
                &config,
                &matrix,
                &labels,
                input_names(&config, &exposures_path),
            )?
        }
        Command::MutationRate(m) => {
            let counts_path = config.resolve(&m.counts);
            let (counts, labels) = read_inputs(&config, &counts_path)?;
            println!(
                "📊 Summarizing {} per {:.2} Mb for {} samples",
                m.count_column,
                m.region_bp as f64 / analysis::stats::BASES_PER_MB,
                counts.len()
            );
            pipeline::mutation_rate_report(
                &config,
                &counts,
                &labels,
                &m.count_column,
                m.region_bp,
                &m.rate_column,
                input_names(&config, &counts_path),
            )?
        }
    };

    let out_dir = config.analysis_dir(&report.metadata.analysis);
    let written = write_outputs(&report, &out_dir, args.format)?;

    print_summary(&report);
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
    println!(
        "\n✅ Wrote {} files to: {}",
        written.len(),
        out_dir.display()
    );
    Ok(0)
}

/// Reads a fact table together with the configured label table.
fn read_inputs(config: &Config, facts_path: &Path) -> Result<(models::Table, models::Table)> {
    let facts = table::read_tsv(facts_path)?;
    let labels = table::read_tsv(&config.resolve(&config.labels.path))
        .context("Failed to read the histology label table")?;
    Ok((facts, labels))
}

fn input_names(config: &Config, facts_path: &Path) -> Vec<String> {
    vec![
        facts_path.display().to_string(),
        config.resolve(&config.labels.path).display().to_string(),
    ]
}

/// Writes one TSV per section and the report itself.
fn write_outputs(report: &Report, out_dir: &Path, format: OutputFormat) -> Result<Vec<PathBuf>> {
    let mut written = report::write_summary_tables(report, out_dir)?;

    let (content, file) = match format {
        OutputFormat::Json => (report::generate_json_report(report)?, "report.json"),
        OutputFormat::Markdown => (report::generate_markdown_report(report), "report.md"),
    };
    let path = out_dir.join(file);
    std::fs::write(&path, &content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    written.push(path);

    Ok(written)
}

fn print_summary(report: &Report) {
    let meta = &report.metadata;
    println!("\n📊 Summary ({}):", meta.analysis);
    println!(
        "   Samples: {} in, {} labeled, {} dropped",
        meta.samples_in,
        meta.samples_joined,
        meta.samples_dropped()
    );
    for section in &report.sections {
        let groups = match section {
            SummarySection::Proportions { rows, .. } => rows.len(),
            SummarySection::Numeric { rows, .. } => rows.len(),
            SummarySection::Levels { rows, .. } => rows.len(),
            SummarySection::Signatures { rows, .. } => rows.len(),
        };
        println!("   - {}: {} rows", section.title(), groups);
    }
    if meta.samples_dropped() > 0 {
        warn!(
            "{} samples had no entry in the label table",
            meta.samples_dropped()
        );
    }
}

/// Download a release. Returns 2 when checksums do not match.
async fn run_download(config: &Config, args: &DownloadArgs, quiet: bool) -> Result<i32> {
    let options = ReleaseOptions {
        url: config.download.url.clone(),
        release: config.download.release.clone(),
        data_dir: config.resolve(&config.download.data_dir),
        symlinks: !args.no_symlinks,
    };

    println!("📥 Downloading release: {}", options.release);
    println!("   From: {}", options.url);
    println!("   Into: {}", options.release_dir().display());

    let fetcher = HttpFetcher::new(config.download.timeout_seconds, !quiet)?;
    let summary = download_release(&fetcher, &options).await?;

    println!("\n📊 Download Summary:");
    println!("   Fetched: {}", summary.fetched.len());
    println!("   Already current: {}", summary.skipped.len());
    println!("   Symlinks: {}", summary.links);

    if !summary.all_verified() {
        for v in &summary.verification {
            match &v.status {
                VerifyStatus::Ok => {}
                VerifyStatus::Missing => eprintln!("   ⛔ {}: missing", v.file),
                VerifyStatus::Mismatch { actual } => {
                    eprintln!("   ⛔ {}: checksum mismatch (got {})", v.file, actual)
                }
            }
        }
        eprintln!("\n⛔ Checksum verification failed. Failing (exit code 2).");
        return Ok(2);
    }

    println!("\n✅ Release {} verified.", options.release);
    Ok(0)
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is initialized, so problems go to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load {}: {:#}", CONFIG_FILE_NAME, e);
            Ok(Config::default())
        }
    }
}
