//! Analysis presets.
//!
//! Each preset joins its fact table against the label table and runs the
//! group-wise summaries once per configured dimension, returning a
//! [`Report`] ready to be written.

use crate::analysis::aggregator::parse_number;
use crate::analysis::signatures::{rank_signatures, summarize_signatures};
use crate::analysis::stats::{add_per_megabase_column, level_breakdown, numeric_summary};
use crate::analysis::{summarize_proportions, AggregateResult, GroupOptions, Predicate};
use crate::config::{Config, DimensionConfig};
use crate::models::{is_missing, Report, ReportMetadata, SortOrder, SummarySection, Table};
use crate::table::inner_join;
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info};

/// Derived chromothripsis confidence column.
pub const CONFIDENCE_COLUMN: &str = "chromothripsis_confidence";

/// Parameters of a generic proportion run.
#[derive(Debug, Clone)]
pub struct ProportionRequest {
    pub name: String,
    pub predicate_column: String,
    pub predicate: Predicate,
    /// Dimensions to group by; empty means the configured dimensions.
    pub group_by: Vec<String>,
    /// Overrides every dimension's configured order.
    pub sort: Option<SortOrder>,
}

/// Joins a fact table with the label table on the configured identifier.
pub fn join_with_labels(facts: &Table, labels: &Table, config: &Config) -> Result<Table> {
    let joined = inner_join(facts, labels, &config.labels.id_column).with_context(|| {
        format!(
            "Failed to join against label table on {}",
            config.labels.id_column
        )
    })?;
    info!(
        "{} of {} samples matched the label table",
        joined.len(),
        facts.len()
    );
    Ok(joined)
}

/// Grouping options for one dimension under the current configuration.
pub fn dimension_options(config: &Config, sort: SortOrder) -> GroupOptions {
    GroupOptions {
        min_group_size: config.aggregate.min_group_size,
        sort,
        color_column: config.labels.color_column.clone(),
        order_column: config.labels.order_column.clone(),
    }
}

fn metadata(analysis: &str, inputs: Vec<String>, samples_in: usize, joined: usize) -> ReportMetadata {
    ReportMetadata {
        analysis: analysis.to_string(),
        analysis_date: Utc::now(),
        inputs,
        samples_in,
        samples_joined: joined,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn common_notes(config: &Config) -> Vec<String> {
    let mut notes = Vec::new();
    if let Some(min) = config.aggregate.min_group_size {
        notes.push(format!("Groups with fewer than {} samples were removed.", min));
    }
    notes
}

/// Proportion of samples satisfying a predicate, per dimension.
pub fn proportions_report(
    config: &Config,
    facts: &Table,
    labels: &Table,
    request: &ProportionRequest,
    inputs: Vec<String>,
) -> Result<Report> {
    let joined = join_with_labels(facts, labels, config)?;

    let dimensions: Vec<DimensionConfig> = if request.group_by.is_empty() {
        config.aggregate.dimensions.clone()
    } else {
        request
            .group_by
            .iter()
            .map(|column| DimensionConfig {
                column: column.clone(),
                sort: SortOrder::default(),
            })
            .collect()
    };

    let mut sections = Vec::with_capacity(dimensions.len());
    for dim in &dimensions {
        let sort = request.sort.unwrap_or(dim.sort);
        let rows = summarize_proportions(
            &joined,
            &dim.column,
            &request.predicate_column,
            &request.predicate,
            &dimension_options(config, sort),
        )
        .with_context(|| format!("Failed to summarize by {}", dim.column))?;
        debug!("{}: {} groups ({})", dim.column, rows.len(), sort);

        sections.push(SummarySection::Proportions {
            title: format!("{} by {}", request.predicate_column, dim.column),
            dimension: dim.column.clone(),
            rows,
        });
    }

    Ok(Report {
        metadata: metadata(&request.name, inputs, facts.len(), joined.len()),
        sections,
        notes: common_notes(config),
    })
}

/// Adds a `High` / `Low` / `None` confidence column from region counts.
pub fn derive_confidence(calls: &mut Table, config: &Config) -> AggregateResult<()> {
    let cfg = &config.chromothripsis;
    let high_idx = calls.column_index(&cfg.high_conf_column)?;
    let low_idx = calls.column_index(&cfg.low_conf_column)?;

    let mut values = Vec::with_capacity(calls.len());
    for row in &calls.rows {
        let (high, low) = (row[high_idx].as_str(), row[low_idx].as_str());
        if is_missing(high) || is_missing(low) {
            values.push("NA".to_string());
            continue;
        }
        let level = if parse_number(&cfg.high_conf_column, high)? > 0.0 {
            "High"
        } else if parse_number(&cfg.low_conf_column, low)? > 0.0 {
            "Low"
        } else {
            "None"
        };
        values.push(level.to_string());
    }

    calls.push_column(CONFIDENCE_COLUMN, values);
    Ok(())
}

/// Chromothripsis frequency, confidence breakdown and region counts.
pub fn chromothripsis_report(
    config: &Config,
    calls: &Table,
    labels: &Table,
    inputs: Vec<String>,
) -> Result<Report> {
    let cfg = &config.chromothripsis;
    let mut calls = calls.clone();
    derive_confidence(&mut calls, config).context("Failed to derive chromothripsis confidence")?;

    let joined = join_with_labels(&calls, labels, config)?;

    let mut sections = Vec::new();
    for dim in &config.aggregate.dimensions {
        let options = dimension_options(config, dim.sort);

        let proportions = summarize_proportions(
            &joined,
            &dim.column,
            &cfg.event_column,
            &Predicate::Truthy,
            &options,
        )
        .with_context(|| format!("Failed to summarize chromothripsis by {}", dim.column))?;

        // Confidence bars follow the proportion order.
        let mut levels = level_breakdown(&joined, &dim.column, CONFIDENCE_COLUMN, &options)?;
        levels.sort_by_key(|b| {
            proportions
                .iter()
                .position(|p| p.group == b.group)
                .unwrap_or(usize::MAX)
        });

        let counts = numeric_summary(&joined, &dim.column, &cfg.count_column, &options)
            .with_context(|| format!("Failed to summarize {}", cfg.count_column))?;

        sections.push(SummarySection::Proportions {
            title: format!("Samples with chromothripsis by {}", dim.column),
            dimension: dim.column.clone(),
            rows: proportions,
        });
        sections.push(SummarySection::Levels {
            title: format!("Chromothripsis confidence by {}", dim.column),
            dimension: dim.column.clone(),
            column: CONFIDENCE_COLUMN.to_string(),
            rows: levels,
        });
        sections.push(SummarySection::Numeric {
            title: format!("Chromothripsis regions by {}", dim.column),
            dimension: dim.column.clone(),
            column: cfg.count_column.clone(),
            rows: counts,
        });
    }

    Ok(Report {
        metadata: metadata("chromothripsis", inputs, calls.len(), joined.len()),
        sections,
        notes: common_notes(config),
    })
}

/// Per-group signature exposures.
pub fn signatures_report(
    config: &Config,
    matrix: &Table,
    labels: &Table,
    inputs: Vec<String>,
) -> Result<Report> {
    let threshold = config.signatures.exposure_threshold;
    let id_column = matrix
        .columns
        .first()
        .cloned()
        .context("Exposure matrix has no columns")?;

    // The matrix identifier column may be named differently from the label
    // table's; align it before joining.
    let mut matrix = matrix.clone();
    if id_column != config.labels.id_column {
        debug!(
            "Renaming matrix identifier column {} to {}",
            id_column, config.labels.id_column
        );
        matrix.columns[0] = config.labels.id_column.clone();
    }
    let joined = join_with_labels(&matrix, labels, config)?;

    let mut sections = Vec::new();
    for dim in &config.aggregate.dimensions {
        let rows = summarize_signatures(
            &matrix,
            labels,
            &config.labels.id_column,
            &dim.column,
            threshold,
            &dimension_options(config, dim.sort),
        )
        .with_context(|| format!("Failed to summarize signatures by {}", dim.column))?;

        sections.push(SummarySection::Signatures {
            title: format!("Signature exposures by {}", dim.column),
            dimension: dim.column.clone(),
            rows,
        });
    }

    let mut notes = common_notes(config);
    notes.push(format!(
        "A sample counts as exposed when its exposure is above {}.",
        threshold
    ));
    let ranked = rank_signatures(&joined_matrix(&matrix, &joined), SortOrder::Descending)?;
    let top: Vec<String> = ranked
        .iter()
        .take(5)
        .map(|(name, mean)| format!("{} ({:.3})", name, mean))
        .collect();
    if !top.is_empty() {
        notes.push(format!("Highest mean exposures: {}.", top.join(", ")));
    }

    Ok(Report {
        metadata: metadata("signatures", inputs, matrix.len(), joined.len()),
        sections,
        notes,
    })
}

/// Matrix restricted to labeled samples.
fn joined_matrix(matrix: &Table, joined: &Table) -> Table {
    Table {
        columns: matrix.columns.clone(),
        rows: joined
            .rows
            .iter()
            .map(|r| r[..matrix.columns.len()].to_vec())
            .collect(),
    }
}

/// Per-megabase mutation rate summaries.
pub fn mutation_rate_report(
    config: &Config,
    counts: &Table,
    labels: &Table,
    count_column: &str,
    region_bp: u64,
    rate_column: &str,
    inputs: Vec<String>,
) -> Result<Report> {
    let mut counts = counts.clone();
    add_per_megabase_column(&mut counts, count_column, region_bp, rate_column)
        .with_context(|| format!("Failed to derive {} from {}", rate_column, count_column))?;

    let joined = join_with_labels(&counts, labels, config)?;

    let mut sections = Vec::new();
    for dim in &config.aggregate.dimensions {
        let rows = numeric_summary(
            &joined,
            &dim.column,
            rate_column,
            &dimension_options(config, dim.sort),
        )
        .with_context(|| format!("Failed to summarize {} by {}", rate_column, dim.column))?;

        sections.push(SummarySection::Numeric {
            title: format!("Mutations per Mb by {}", dim.column),
            dimension: dim.column.clone(),
            column: rate_column.to_string(),
            rows,
        });
    }

    let mut notes = common_notes(config);
    notes.push(format!(
        "Rates use a surveyed region of {} bp ({:.2} Mb).",
        region_bp,
        region_bp as f64 / 1_000_000.0
    ));

    Ok(Report {
        metadata: metadata("mutation-rate", inputs, counts.len(), joined.len()),
        sections,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::read_tsv;
    use std::path::PathBuf;

    fn fixture(name: &str) -> Table {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("fixtures")
            .join(name);
        read_tsv(&path).unwrap()
    }

    fn config() -> Config {
        Config::default()
    }

    #[test]
    fn test_derive_confidence() {
        let mut calls = Table::from_rows(
            &["id", "count_regions_high_conf", "count_regions_low_conf"],
            &[&["a", "2", "0"], &["b", "0", "1"], &["c", "0", "0"], &["d", "NA", "0"]],
        );
        derive_confidence(&mut calls, &config()).unwrap();
        let idx = calls.column_index(CONFIDENCE_COLUMN).unwrap();
        let levels: Vec<_> = calls.rows.iter().map(|r| r[idx].as_str()).collect();
        assert_eq!(levels, vec!["High", "Low", "None", "NA"]);
    }

    #[test]
    fn test_chromothripsis_report() {
        let report = chromothripsis_report(
            &config(),
            &fixture("chromothripsis_per_sample.tsv"),
            &fixture("histology_label_color_table.tsv"),
            vec![],
        )
        .unwrap();

        assert_eq!(report.metadata.samples_in, 10);
        assert_eq!(report.metadata.samples_joined, 9);
        assert_eq!(report.sections.len(), 6);

        let SummarySection::Proportions { rows, .. } = &report.sections[0] else {
            panic!("expected proportions first");
        };
        let groups: Vec<_> = rows.iter().map(|r| r.group.as_str()).collect();
        assert_eq!(groups, vec!["High-grade glioma", "Medulloblastoma", "Low-grade glioma"]);
        assert_eq!(rows[0].label, "3 / 4");
        assert_eq!(rows[0].color.as_deref(), Some("#ff40d9"));

        let SummarySection::Levels { rows: levels, .. } = &report.sections[1] else {
            panic!("expected levels second");
        };
        assert_eq!(levels[0].group, "High-grade glioma");

        let total: usize = rows.iter().map(|r| r.total).sum();
        assert_eq!(total, 9);
    }

    #[test]
    fn test_min_group_size_applies_to_presets() {
        let mut config = config();
        config.aggregate.min_group_size = Some(3);
        let report = chromothripsis_report(
            &config,
            &fixture("chromothripsis_per_sample.tsv"),
            &fixture("histology_label_color_table.tsv"),
            vec![],
        )
        .unwrap();

        let SummarySection::Proportions { rows, .. } = &report.sections[0] else {
            panic!("expected proportions first");
        };
        assert!(rows.iter().all(|r| r.total >= 3));
        assert_eq!(report.notes.len(), 1);
    }

    #[test]
    fn test_proportions_report_group_by_override() {
        let request = ProportionRequest {
            name: "high-confidence".to_string(),
            predicate_column: "count_regions_high_conf".to_string(),
            predicate: Predicate::AtLeast(1.0),
            group_by: vec!["cancer_group".to_string()],
            sort: Some(SortOrder::Ascending),
        };
        let report = proportions_report(
            &config(),
            &fixture("chromothripsis_per_sample.tsv"),
            &fixture("histology_label_color_table.tsv"),
            &request,
            vec!["calls.tsv".to_string()],
        )
        .unwrap();

        assert_eq!(report.metadata.analysis, "high-confidence");
        assert_eq!(report.sections.len(), 1);
        let SummarySection::Proportions { rows, dimension, .. } = &report.sections[0] else {
            panic!("expected proportions");
        };
        assert_eq!(dimension, "cancer_group");
        for pair in rows.windows(2) {
            assert!(pair[0].proportion <= pair[1].proportion);
        }
    }

    #[test]
    fn test_signatures_report() {
        let report = signatures_report(
            &config(),
            &fixture("signature_exposures.tsv"),
            &fixture("histology_label_color_table.tsv"),
            vec![],
        )
        .unwrap();

        assert_eq!(report.sections.len(), 2);
        assert!(report.notes.iter().any(|n| n.starts_with("Highest mean exposures")));
        let SummarySection::Signatures { rows, .. } = &report.sections[0] else {
            panic!("expected signatures");
        };
        assert!(rows.iter().all(|r| r.count_exposed <= r.n));
    }

    #[test]
    fn test_mutation_rate_report() {
        let report = mutation_rate_report(
            &config(),
            &fixture("snv_counts.tsv"),
            &fixture("histology_label_color_table.tsv"),
            "snv_count",
            50_000_000,
            "tmb",
            vec![],
        )
        .unwrap();

        let SummarySection::Numeric { rows, column, .. } = &report.sections[0] else {
            panic!("expected numeric");
        };
        assert_eq!(column, "tmb");
        let hgg = rows.iter().find(|r| r.group == "High-grade glioma").unwrap();
        assert_eq!(hgg.median, 5.0);
    }

    #[test]
    fn test_unlabeled_facts_fail() {
        let facts = Table::from_rows(
            &["Kids_First_Biospecimen_ID", "any_regions_logical"],
            &[&["BS_NOPE", "TRUE"]],
        );
        let err = proportions_report(
            &config(),
            &facts,
            &fixture("histology_label_color_table.tsv"),
            &ProportionRequest {
                name: "x".to_string(),
                predicate_column: "any_regions_logical".to_string(),
                predicate: Predicate::Truthy,
                group_by: vec![],
                sort: None,
            },
            vec![],
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("no rows matched"));
    }
}
