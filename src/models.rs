//! Data models for the summary pipeline.
//!
//! This module contains the in-memory table representation, the per-group
//! summary rows produced by the analysis layer, and the report structures
//! written at the end of a run.

use crate::analysis::error::{AggregateError, AggregateResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cell values treated as "no value" in every input table.
pub const MISSING_VALUES: &[&str] = &["", "NA", "NaN", "nan", "."];

/// Returns true if a cell holds no usable value.
pub fn is_missing(value: &str) -> bool {
    MISSING_VALUES.contains(&value.trim())
}

/// A rectangular table of string cells with a named header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Column names in file order.
    pub columns: Vec<String>,
    /// Rows, each with exactly `columns.len()` cells.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates an empty table with the given header.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from string literals. Handy for fixtures and tests.
    #[cfg(test)]
    pub fn from_rows(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, or `MissingColumn`.
    pub fn column_index(&self, name: &str) -> AggregateResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| AggregateError::MissingColumn(name.to_string()))
    }

    /// Returns true if the header contains `name`.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Cell at (row, column index).
    pub fn cell(&self, row: usize, column: usize) -> &str {
        &self.rows[row][column]
    }

    /// Appends a derived column. `values` must have one entry per row.
    pub fn push_column(&mut self, name: &str, values: Vec<String>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }
}

/// Direction in which groups are ordered for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest statistic first.
    Ascending,
    /// Largest statistic first.
    #[default]
    Descending,
    /// Ascending by the label table's numeric sort key.
    Label,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Ascending => write!(f, "ascending"),
            SortOrder::Descending => write!(f, "descending"),
            SortOrder::Label => write!(f, "label order"),
        }
    }
}

/// One row of a proportion summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Distinct value of the grouping column.
    pub group: String,
    /// Display color taken from the label table, if configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Numeric sort key taken from the label table, if configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<f64>,
    /// Members satisfying the predicate.
    pub count_true: usize,
    /// All members of the group.
    pub total: usize,
    /// `count_true / total`.
    pub proportion: f64,
    /// Human-readable "k / n".
    pub label: String,
    /// 1-based position after ordering.
    pub rank: usize,
}

impl GroupSummary {
    /// Formats the "k / n" label used on plot axes.
    pub fn format_label(count_true: usize, total: usize) -> String {
        format!("{} / {}", count_true, total)
    }
}

/// Location and spread of a continuous column within one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<f64>,
    /// Non-missing values in the group.
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub rank: usize,
}

/// Count of one categorical level inside a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelCount {
    pub level: String,
    pub count: usize,
    /// Share of the group, in [0, 1].
    pub fraction: f64,
}

/// Distribution of a categorical column inside one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelBreakdown {
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub total: usize,
    pub levels: Vec<LevelCount>,
}

/// Exposure to one mutational signature within one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureSummary {
    pub group: String,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Samples in the group.
    pub n: usize,
    pub mean_exposure: f64,
    /// Samples whose exposure exceeds the threshold.
    pub count_exposed: usize,
    pub proportion_exposed: f64,
    pub label: String,
}

/// A titled summary table in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SummarySection {
    Proportions {
        title: String,
        dimension: String,
        rows: Vec<GroupSummary>,
    },
    Numeric {
        title: String,
        dimension: String,
        column: String,
        rows: Vec<NumericSummary>,
    },
    Levels {
        title: String,
        dimension: String,
        column: String,
        rows: Vec<LevelBreakdown>,
    },
    Signatures {
        title: String,
        dimension: String,
        rows: Vec<SignatureSummary>,
    },
}

impl SummarySection {
    /// Section title.
    pub fn title(&self) -> &str {
        match self {
            SummarySection::Proportions { title, .. }
            | SummarySection::Numeric { title, .. }
            | SummarySection::Levels { title, .. }
            | SummarySection::Signatures { title, .. } => title,
        }
    }

    /// Grouping column the section was computed over.
    pub fn dimension(&self) -> &str {
        match self {
            SummarySection::Proportions { dimension, .. }
            | SummarySection::Numeric { dimension, .. }
            | SummarySection::Levels { dimension, .. }
            | SummarySection::Signatures { dimension, .. } => dimension,
        }
    }

    /// Short file-name friendly slug of the section kind.
    pub fn kind_slug(&self) -> &'static str {
        match self {
            SummarySection::Proportions { .. } => "proportions",
            SummarySection::Numeric { .. } => "numeric",
            SummarySection::Levels { .. } => "levels",
            SummarySection::Signatures { .. } => "signatures",
        }
    }
}

/// Metadata about a summary run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Name of the analysis (e.g. "chromothripsis").
    pub analysis: String,
    /// Date and time of the run.
    pub analysis_date: DateTime<Utc>,
    /// Input files that were read.
    pub inputs: Vec<String>,
    /// Rows in the fact table before the join.
    pub samples_in: usize,
    /// Rows surviving the inner join with the label table.
    pub samples_joined: usize,
    /// Version of this tool.
    pub tool_version: String,
}

impl ReportMetadata {
    /// Samples silently dropped by the inner join.
    pub fn samples_dropped(&self) -> usize {
        self.samples_in.saturating_sub(self.samples_joined)
    }
}

/// The complete summary report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub sections: Vec<SummarySection>,
    /// Free-form notes shown under the metadata.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}
