//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.pbta-summary.toml` files. Every relative path in the configuration is
//! resolved against `general.root_dir`.

use crate::models::SortOrder;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = ".pbta-summary.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Histology label and color table.
    #[serde(default)]
    pub labels: LabelConfig,

    /// Grouping and filtering settings.
    #[serde(default)]
    pub aggregate: AggregateConfig,

    /// Chromothripsis call table layout.
    #[serde(default)]
    pub chromothripsis: ChromothripsisConfig,

    /// Signature exposure settings.
    #[serde(default)]
    pub signatures: SignatureConfig,

    /// Data release download settings.
    #[serde(default)]
    pub download: DownloadConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Project root; relative paths are resolved against it.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Directory receiving one sub-directory per analysis.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            output_dir: default_output_dir(),
            verbose: false,
        }
    }
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Reference table mapping samples to histology groups and colors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Path to the label/color table.
    #[serde(default = "default_label_path")]
    pub path: PathBuf,

    /// Sample identifier column shared with every fact table.
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Column holding the display color.
    #[serde(default = "default_color_column")]
    pub color_column: Option<String>,

    /// Column holding the numeric display order.
    #[serde(default = "default_order_column")]
    pub order_column: Option<String>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            path: default_label_path(),
            id_column: default_id_column(),
            color_column: default_color_column(),
            order_column: default_order_column(),
        }
    }
}

fn default_label_path() -> PathBuf {
    PathBuf::from("figures/palettes/histology_label_color_table.tsv")
}

fn default_id_column() -> String {
    "Kids_First_Biospecimen_ID".to_string()
}

fn default_color_column() -> Option<String> {
    Some("hex_codes".to_string())
}

fn default_order_column() -> Option<String> {
    Some("display_order".to_string())
}

/// One grouping dimension of the label table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionConfig {
    /// Label-table column to group by.
    pub column: String,

    /// Display order of the groups.
    #[serde(default)]
    pub sort: SortOrder,
}

impl DimensionConfig {
    fn new(column: &str, sort: SortOrder) -> Self {
        Self {
            column: column.to_string(),
            sort,
        }
    }
}

/// Grouping and filtering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    /// Groups with fewer samples are left out of every summary.
    #[serde(default)]
    pub min_group_size: Option<usize>,

    /// Dimensions every preset analysis is run over.
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<DimensionConfig>,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            min_group_size: None,
            dimensions: default_dimensions(),
        }
    }
}

fn default_dimensions() -> Vec<DimensionConfig> {
    vec![
        DimensionConfig::new("display_group", SortOrder::Descending),
        DimensionConfig::new("cancer_group", SortOrder::Descending),
    ]
}

/// Column layout of the chromothripsis per-sample call table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromothripsisConfig {
    /// Boolean column: any chromothripsis region called.
    #[serde(default = "default_event_column")]
    pub event_column: String,

    /// Number of regions at any confidence.
    #[serde(default = "default_count_column")]
    pub count_column: String,

    /// Number of high-confidence regions.
    #[serde(default = "default_high_conf_column")]
    pub high_conf_column: String,

    /// Number of low-confidence regions.
    #[serde(default = "default_low_conf_column")]
    pub low_conf_column: String,
}

impl Default for ChromothripsisConfig {
    fn default() -> Self {
        Self {
            event_column: default_event_column(),
            count_column: default_count_column(),
            high_conf_column: default_high_conf_column(),
            low_conf_column: default_low_conf_column(),
        }
    }
}

fn default_event_column() -> String {
    "any_regions_logical".to_string()
}

fn default_count_column() -> String {
    "count_regions_any_conf".to_string()
}

fn default_high_conf_column() -> String {
    "count_regions_high_conf".to_string()
}

fn default_low_conf_column() -> String {
    "count_regions_low_conf".to_string()
}

/// Signature exposure settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureConfig {
    /// Exposures strictly above this value count as "exposed".
    #[serde(default)]
    pub exposure_threshold: f64,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            exposure_threshold: 0.0,
        }
    }
}

/// Data release download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Base URL of the release bucket.
    #[serde(default = "default_url")]
    pub url: String,

    /// Release tag (directory under the base URL).
    #[serde(default = "default_release")]
    pub release: String,

    /// Local data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            release: default_release(),
            data_dir: default_data_dir(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_url() -> String {
    "https://s3.amazonaws.com/d3b-openaccess-us-east-1-prd-pbta/data".to_string()
}

fn default_release() -> String {
    "release-v23-20230115".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_timeout() -> u64 {
    3600 // large release files
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
        if let Some(ref root_dir) = args.root_dir {
            self.general.root_dir = root_dir.clone();
        }
        if let Some(ref output_dir) = args.output_dir {
            self.general.output_dir = output_dir.clone();
        }
        if let Some(ref labels) = args.labels {
            self.labels.path = labels.clone();
        }
        if let Some(min) = args.min_group_size {
            self.aggregate.min_group_size = Some(min);
        }
        if args.verbose {
            self.general.verbose = true;
        }

        match &args.command {
            crate::cli::Command::Signatures(sig) => {
                if let Some(threshold) = sig.threshold {
                    self.signatures.exposure_threshold = threshold;
                }
            }
            crate::cli::Command::Download(dl) => {
                if let Some(ref url) = dl.url {
                    self.download.url = url.clone();
                }
                if let Some(ref release) = dl.release {
                    self.download.release = release.clone();
                }
                if let Some(ref data_dir) = dl.data_dir {
                    self.download.data_dir = data_dir.clone();
                }
            }
            _ => {}
        }
    }

    /// Resolves a configured path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.general.root_dir.join(path)
        }
    }

    /// Output directory for one analysis, under the configured root.
    pub fn analysis_dir(&self, analysis: &str) -> PathBuf {
        self.resolve(&self.general.output_dir).join(analysis)
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
    use crate::cli::Args;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.labels.id_column, "Kids_First_Biospecimen_ID");
        assert_eq!(config.aggregate.dimensions.len(), 2);
        assert_eq!(config.aggregate.dimensions[0].column, "display_group");
        assert_eq!(config.aggregate.dimensions[1].sort, SortOrder::Descending);
        assert_eq!(config.download.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
root_dir = "/project"
output_dir = "plots"

[labels]
path = "palettes/labels.tsv"
color_column = "color"

[aggregate]
min_group_size = 5

[[aggregate.dimensions]]
column = "cancer_group"
sort = "ascending"

[signatures]
exposure_threshold = 0.05
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.root_dir, PathBuf::from("/project"));
        assert_eq!(config.labels.color_column.as_deref(), Some("color"));
        assert_eq!(config.labels.order_column.as_deref(), Some("display_order"));
        assert_eq!(config.aggregate.min_group_size, Some(5));
        assert_eq!(
            config.aggregate.dimensions,
            vec![DimensionConfig::new("cancer_group", SortOrder::Ascending)]
        );
        assert_eq!(config.signatures.exposure_threshold, 0.05);
        assert_eq!(config.download.release, "release-v23-20230115");
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = Config::default();
        config.general.root_dir = PathBuf::from("/project");
        assert_eq!(
            config.resolve(Path::new("data/calls.tsv")),
            PathBuf::from("/project/data/calls.tsv")
        );
        assert_eq!(
            config.resolve(Path::new("/abs/calls.tsv")),
            PathBuf::from("/abs/calls.tsv")
        );
        assert_eq!(
            config.analysis_dir("chromothripsis"),
            PathBuf::from("/project/results/chromothripsis")
        );
    }

    #[test]
    fn test_merge_with_args() {
        let args = Args::try_parse_from([
            "pbta-summary",
            "--root-dir",
            "/project",
            "--min-group-size",
            "3",
            "download",
            "--release",
            "release-v22",
        ])
        .unwrap();

        let mut config = Config::default();
        config.merge_with_args(&args);
        assert_eq!(config.general.root_dir, PathBuf::from("/project"));
        assert_eq!(config.aggregate.min_group_size, Some(3));
        assert_eq!(config.download.release, "release-v22");
        assert_eq!(config.general.output_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_verbose_from_config_file() {
        let mut config: Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        let args = Args::try_parse_from(["pbta-summary", "init-config"]).unwrap();
        config.merge_with_args(&args);
        assert!(config.general.verbose);
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::DEBUG);

        let quiet = Args::try_parse_from(["pbta-summary", "-q", "init-config"]).unwrap();
        assert_eq!(quiet.log_level(config.general.verbose), tracing::Level::ERROR);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[labels]"));
        assert!(toml_str.contains("[download]"));
    }
}
