//! Report generation.
//!
//! This module renders a [`Report`] as Markdown or JSON and writes each
//! summary section as a plot-ready TSV table.

use crate::models::{
    GroupSummary, LevelBreakdown, NumericSummary, Report, ReportMetadata, SignatureSummary,
    SummarySection,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    // Title
    output.push_str(&format!("# {} summary\n\n", report.metadata.analysis));

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(report));
    output.push_str(&generate_notes_section(&report.notes));

    for section in &report.sections {
        output.push_str(&generate_section(section));
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    for input in &metadata.inputs {
        section.push_str(&format!("- **Input:** `{}`\n", input));
    }
    section.push_str(&format!("- **Samples in:** {}\n", metadata.samples_in));
    section.push_str(&format!(
        "- **Samples with labels:** {}\n",
        metadata.samples_joined
    ));
    if metadata.samples_dropped() > 0 {
        section.push_str(&format!(
            "- **Samples without labels (dropped):** {}\n",
            metadata.samples_dropped()
        ));
    }
    section.push_str(&format!("- **Tool version:** {}\n", metadata.tool_version));
    section.push('\n');

    section
}

/// Generate the table of contents.
fn generate_table_of_contents(report: &Report) -> String {
    let mut toc = String::new();

    toc.push_str("## Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    if !report.notes.is_empty() {
        toc.push_str("- [Notes](#notes)\n");
    }
    for section in &report.sections {
        toc.push_str(&format!(
            "- [{}](#{})\n",
            section.title(),
            anchor(section.title())
        ));
    }
    toc.push('\n');

    toc
}

fn generate_notes_section(notes: &[String]) -> String {
    if notes.is_empty() {
        return String::new();
    }

    let mut section = String::from("## Notes\n\n");
    for note in notes {
        section.push_str(&format!("- {}\n", note));
    }
    section.push('\n');
    section
}

/// Generate one summary section.
fn generate_section(section: &SummarySection) -> String {
    let mut out = format!("## {}\n\n", section.title());
    out.push_str(&format!("*Grouped by `{}`*\n\n", section.dimension()));

    match section {
        SummarySection::Proportions { rows, .. } => out.push_str(&proportions_table(rows)),
        SummarySection::Numeric { column, rows, .. } => {
            out.push_str(&numeric_table(column, rows))
        }
        SummarySection::Levels { column, rows, .. } => out.push_str(&levels_table(column, rows)),
        SummarySection::Signatures { rows, .. } => out.push_str(&signatures_table(rows)),
    }
    out.push('\n');

    out
}

fn proportions_table(rows: &[GroupSummary]) -> String {
    let mut table = String::new();
    table.push_str("| Rank | Group | k / n | Proportion | Color |\n");
    table.push_str("|:---:|:---|:---:|:---:|:---:|\n");
    for row in rows {
        table.push_str(&format!(
            "| {} | {} | {} | {:.1}% | {} |\n",
            row.rank,
            row.group,
            row.label,
            row.proportion * 100.0,
            color_cell(row.color.as_deref())
        ));
    }
    table
}

fn numeric_table(column: &str, rows: &[NumericSummary]) -> String {
    let mut table = String::new();
    table.push_str(&format!("Statistic: `{}`\n\n", column));
    table.push_str("| Rank | Group | n | Mean | Median | Min | Max |\n");
    table.push_str("|:---:|:---|:---:|:---:|:---:|:---:|:---:|\n");
    for row in rows {
        table.push_str(&format!(
            "| {} | {} | {} | {:.3} | {:.3} | {:.3} | {:.3} |\n",
            row.rank, row.group, row.n, row.mean, row.median, row.min, row.max
        ));
    }
    table
}

fn levels_table(column: &str, rows: &[LevelBreakdown]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let levels: Vec<&str> = first.levels.iter().map(|l| l.level.as_str()).collect();

    let mut table = String::new();
    table.push_str(&format!("Levels of `{}`\n\n", column));
    table.push_str("| Group | n |");
    for level in &levels {
        table.push_str(&format!(" {} |", level));
    }
    table.push_str("\n|:---|:---:|");
    for _ in &levels {
        table.push_str(":---:|");
    }
    table.push('\n');

    for row in rows {
        table.push_str(&format!("| {} | {} |", row.group, row.total));
        for level in &row.levels {
            table.push_str(&format!(
                " {} ({:.1}%) |",
                level.count,
                level.fraction * 100.0
            ));
        }
        table.push('\n');
    }
    table
}

fn signatures_table(rows: &[SignatureSummary]) -> String {
    let mut table = String::new();
    table.push_str("| Group | Signature | Mean exposure | Exposed | Proportion |\n");
    table.push_str("|:---|:---|:---:|:---:|:---:|\n");
    for row in rows {
        table.push_str(&format!(
            "| {} | {} | {:.3} | {} | {:.1}% |\n",
            row.group,
            row.signature,
            row.mean_exposure,
            row.label,
            row.proportion_exposed * 100.0
        ));
    }
    table
}

fn color_cell(color: Option<&str>) -> String {
    match color {
        Some(c) => format!("`{}`", c),
        None => "-".to_string(),
    }
}

fn anchor(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | '0'..='9' | '-' | '_' => Some(c),
            ' ' => Some('-'),
            _ => None,
        })
        .collect()
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by pbta-summary {}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// File name of a section's TSV table.
pub fn section_file_name(section: &SummarySection) -> String {
    let mut parts = vec![section.kind_slug().to_string()];
    match section {
        SummarySection::Numeric { column, .. } | SummarySection::Levels { column, .. } => {
            parts.push(slug(column))
        }
        _ => {}
    }
    parts.push(slug(section.dimension()));
    format!("{}.tsv", parts.join("_"))
}

fn slug(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Write one section as a tab-separated table.
pub fn write_section_tsv(section: &SummarySection, path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "NA".to_string());

    match section {
        SummarySection::Proportions { rows, .. } => {
            writer.write_record([
                "group", "count_true", "total", "proportion", "label", "rank", "color",
            ])?;
            for r in rows {
                writer.write_record([
                    r.group.clone(),
                    r.count_true.to_string(),
                    r.total.to_string(),
                    r.proportion.to_string(),
                    r.label.clone(),
                    r.rank.to_string(),
                    opt(&r.color),
                ])?;
            }
        }
        SummarySection::Numeric { rows, .. } => {
            writer.write_record([
                "group", "n", "mean", "median", "min", "max", "rank", "color",
            ])?;
            for r in rows {
                writer.write_record([
                    r.group.clone(),
                    r.n.to_string(),
                    r.mean.to_string(),
                    r.median.to_string(),
                    r.min.to_string(),
                    r.max.to_string(),
                    r.rank.to_string(),
                    opt(&r.color),
                ])?;
            }
        }
        SummarySection::Levels { rows, .. } => {
            writer.write_record(["group", "level", "count", "total", "fraction", "color"])?;
            for r in rows {
                for level in &r.levels {
                    writer.write_record([
                        r.group.clone(),
                        level.level.clone(),
                        level.count.to_string(),
                        r.total.to_string(),
                        level.fraction.to_string(),
                        opt(&r.color),
                    ])?;
                }
            }
        }
        SummarySection::Signatures { rows, .. } => {
            writer.write_record([
                "group",
                "signature",
                "n",
                "mean_exposure",
                "count_exposed",
                "proportion_exposed",
                "label",
                "color",
            ])?;
            for r in rows {
                writer.write_record([
                    r.group.clone(),
                    r.signature.clone(),
                    r.n.to_string(),
                    r.mean_exposure.to_string(),
                    r.count_exposed.to_string(),
                    r.proportion_exposed.to_string(),
                    r.label.clone(),
                    opt(&r.color),
                ])?;
            }
        }
    }

    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Write every section table into `dir`, creating it if needed.
pub fn write_summary_tables(report: &Report, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut written = Vec::with_capacity(report.sections.len());
    for section in &report.sections {
        let path = dir.join(section_file_name(section));
        write_section_tsv(section, &path)?;
        written.push(path);
    }
    Ok(written)
}
