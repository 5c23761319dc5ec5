//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::analysis::Predicate;
use crate::models::SortOrder;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// pbta-summary - per-histology summary tables for OpenPBTA results
///
/// Joins per-sample result tables against the histology label/color table
/// and writes plot-ready group summaries (proportions, "k / n" labels,
/// means and medians) plus a Markdown or JSON report.
///
/// Examples:
///   pbta-summary chromothripsis --calls analyses/chromothripsis/results/chromothripsis_summary_per_sample.txt
///   pbta-summary signatures --exposures analyses/mutational-signatures/results/exposures.tsv --threshold 0.05
///   pbta-summary proportions --facts calls.tsv --predicate-column confidence --predicate equals:High
///   pbta-summary download --release release-v23-20230115
///   pbta-summary init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .pbta-summary.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Project root; relative input and output paths resolve against it
    #[arg(long, value_name = "DIR", env = "OPENPBTA_ROOT", global = true)]
    pub root_dir: Option<PathBuf>,

    /// Directory receiving one sub-directory per analysis
    #[arg(short, long, value_name = "DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    /// Histology label/color table
    #[arg(long, value_name = "FILE", global = true)]
    pub labels: Option<PathBuf>,

    /// Drop groups with fewer samples than this
    #[arg(long, value_name = "COUNT", global = true)]
    pub min_group_size: Option<usize>,

    /// Report format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT", global = true)]
    pub format: OutputFormat,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Proportion of samples satisfying a predicate, per group
    Proportions(ProportionsArgs),

    /// Chromothripsis frequency, confidence and region counts per group
    Chromothripsis(ChromothripsisArgs),

    /// Mutational signature exposures per group
    Signatures(SignaturesArgs),

    /// Per-megabase mutation rates per group
    MutationRate(MutationRateArgs),

    /// Download and verify a data release
    Download(DownloadArgs),

    /// Generate a default .pbta-summary.toml configuration file
    InitConfig,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ProportionsArgs {
    /// Per-sample fact table (TSV)
    #[arg(long, value_name = "FILE")]
    pub facts: PathBuf,

    /// Column the predicate is evaluated on
    #[arg(long, value_name = "COLUMN")]
    pub predicate_column: String,

    /// truthy, equals:X, one-of:X,Y, at-least:N or above:N
    #[arg(long, default_value = "truthy", value_name = "PREDICATE")]
    pub predicate: Predicate,

    /// Label-table columns to group by (default: configured dimensions)
    #[arg(long, value_name = "COLUMN", value_delimiter = ',')]
    pub group_by: Vec<String>,

    /// Group order (overrides the configured order of every dimension)
    #[arg(long, value_name = "ORDER")]
    pub sort: Option<SortArg>,

    /// Name of the analysis (output sub-directory)
    #[arg(long, default_value = "proportions", value_name = "NAME")]
    pub name: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ChromothripsisArgs {
    /// Chromothripsis per-sample summary table (TSV)
    #[arg(long, value_name = "FILE")]
    pub calls: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SignaturesArgs {
    /// Sample x signature exposure matrix (TSV, identifiers in the first column)
    #[arg(long, value_name = "FILE")]
    pub exposures: PathBuf,

    /// Exposures strictly above this value count as exposed
    #[arg(long, value_name = "VALUE")]
    pub threshold: Option<f64>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct MutationRateArgs {
    /// Per-sample mutation count table (TSV)
    #[arg(long, value_name = "FILE")]
    pub counts: PathBuf,

    /// Column holding the mutation count
    #[arg(long, value_name = "COLUMN")]
    pub count_column: String,

    /// Size of the surveyed region in base pairs
    #[arg(long, value_name = "BP")]
    pub region_bp: u64,

    /// Name of the derived per-megabase column
    #[arg(long, default_value = "mutations_per_mb", value_name = "COLUMN")]
    pub rate_column: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Base URL of the release bucket
    #[arg(long, value_name = "URL", env = "OPENPBTA_URL")]
    pub url: Option<String>,

    /// Release tag to download
    #[arg(long, value_name = "TAG", env = "OPENPBTA_RELEASE")]
    pub release: Option<String>,

    /// Local data directory
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Skip creating the generic symlinks
    #[arg(long)]
    pub no_symlinks: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Group order as typed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SortArg {
    Asc,
    Desc,
    Label,
}

impl From<SortArg> for SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Asc => SortOrder::Ascending,
            SortArg::Desc => SortOrder::Descending,
            SortArg::Label => SortOrder::Label,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.min_group_size == Some(0) {
            return Err("Minimum group size must be at least 1".to_string());
        }

        match &self.command {
            Command::Signatures(sig) => {
                if let Some(threshold) = sig.threshold {
                    if !threshold.is_finite() || threshold < 0.0 {
                        return Err("Exposure threshold must be a non-negative number".to_string());
                    }
                }
            }
            Command::MutationRate(rate) => {
                if rate.region_bp == 0 {
                    return Err("Region size must be at least 1 bp".to_string());
                }
            }
            Command::Download(dl) => {
                if let Some(ref url) = dl.url {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        return Err("Download URL must start with 'http://' or 'https://'".to_string());
                    }
                }
                if dl.release.as_deref().is_some_and(|r| r.trim().is_empty()) {
                    return Err("Release tag must not be empty".to_string());
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `general.verbose` from the configuration file;
    /// `--quiet` wins over both.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["pbta-summary"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_proportions() {
        let args = parse(&[
            "proportions",
            "--facts",
            "calls.tsv",
            "--predicate-column",
            "confidence",
            "--predicate",
            "one-of:High,Low",
            "--group-by",
            "display_group,cancer_group",
            "--sort",
            "asc",
        ]);

        let Command::Proportions(p) = args.command else {
            panic!("expected proportions");
        };
        assert_eq!(p.facts, PathBuf::from("calls.tsv"));
        assert_eq!(
            p.predicate,
            Predicate::OneOf(vec!["High".to_string(), "Low".to_string()])
        );
        assert_eq!(p.group_by, vec!["display_group", "cancer_group"]);
        assert_eq!(p.sort.map(SortOrder::from), Some(SortOrder::Ascending));
        assert_eq!(p.name, "proportions");
    }

    #[test]
    fn test_default_predicate_is_truthy() {
        let args = parse(&["proportions", "--facts", "f.tsv", "--predicate-column", "x"]);
        let Command::Proportions(p) = args.command else {
            panic!("expected proportions");
        };
        assert_eq!(p.predicate, Predicate::Truthy);
        assert!(p.group_by.is_empty());
    }

    #[test]
    fn test_invalid_predicate_rejected() {
        let result = Args::try_parse_from([
            "pbta-summary",
            "proportions",
            "--facts",
            "f.tsv",
            "--predicate-column",
            "x",
            "--predicate",
            "bogus",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["chromothripsis", "--calls", "c.tsv", "--format", "json", "-v"]);
        assert_eq!(args.format, OutputFormat::Json);
        assert!(args.verbose);
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = parse(&["init-config"]);
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_region() {
        let args = parse(&[
            "mutation-rate",
            "--counts",
            "counts.tsv",
            "--count-column",
            "snv",
            "--region-bp",
            "0",
        ]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_download_url() {
        let args = parse(&["download", "--url", "ftp://example.org/data"]);
        assert!(args.validate().is_err());

        let args = parse(&["download", "--url", "https://example.org/data"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_min_group_size() {
        let args = parse(&["--min-group-size", "0", "init-config"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = parse(&["init-config"]);
        assert_eq!(args.log_level(false), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
    }

    #[test]
    fn test_log_level_from_config() {
        let mut args = parse(&["init-config"]);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
