//! Group-wise proportion aggregation.
//!
//! This module turns a joined sample table into one summary row per group:
//! how many members satisfy a predicate, how many members there are, the
//! resulting proportion and its "k / n" label. The same grouping and
//! ordering helpers back the numeric and signature summaries.

use crate::analysis::error::{AggregateError, AggregateResult};
use crate::models::{is_missing, GroupSummary, SortOrder, Table};
use std::collections::HashMap;
use std::str::FromStr;

/// Reduces a predicate cell to true/false.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Boolean-like cell (`TRUE`, `yes`, `1`, ...).
    Truthy,
    /// Cell equals the given level.
    Equals(String),
    /// Cell equals any of the given levels.
    OneOf(Vec<String>),
    /// Cell parses as a number at or above the threshold.
    AtLeast(f64),
    /// Cell parses as a number strictly above the threshold.
    Above(f64),
}

impl Predicate {
    /// Evaluates the predicate on one cell of `column`.
    pub fn evaluate(&self, column: &str, value: &str) -> AggregateResult<bool> {
        let value = value.trim();
        match self {
            Predicate::Truthy => parse_bool(value).ok_or_else(|| AggregateError::NotBoolean {
                column: column.to_string(),
                value: value.to_string(),
            }),
            Predicate::Equals(level) => Ok(value == level),
            Predicate::OneOf(levels) => Ok(levels.iter().any(|l| l == value)),
            Predicate::AtLeast(threshold) => Ok(parse_number(column, value)? >= *threshold),
            Predicate::Above(threshold) => Ok(parse_number(column, value)? > *threshold),
        }
    }
}

impl FromStr for Predicate {
    type Err = String;

    /// Parses `truthy`, `equals:X`, `one-of:X,Y`, `at-least:N` or `above:N`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind.trim().to_lowercase(), Some(arg.trim())),
            None => (s.trim().to_lowercase(), None),
        };

        match (kind.as_str(), arg) {
            ("truthy", None) => Ok(Predicate::Truthy),
            ("equals", Some(level)) if !level.is_empty() => Ok(Predicate::Equals(level.to_string())),
            ("one-of", Some(levels)) => {
                let levels: Vec<String> = levels
                    .split(',')
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                if levels.is_empty() {
                    Err("one-of needs at least one level".to_string())
                } else {
                    Ok(Predicate::OneOf(levels))
                }
            }
            ("at-least", Some(n)) => n
                .parse()
                .map(Predicate::AtLeast)
                .map_err(|_| format!("invalid threshold '{}'", n)),
            ("above", Some(n)) => n
                .parse()
                .map(Predicate::Above)
                .map_err(|_| format!("invalid threshold '{}'", n)),
            _ => Err(format!(
                "unknown predicate '{}' (expected truthy, equals:X, one-of:X,Y, at-least:N or above:N)",
                s
            )),
        }
    }
}

/// Boolean spellings found in R-exported tables.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "TRUE" | "True" | "true" | "T" | "yes" | "Yes" | "YES" | "1" => Some(true),
        "FALSE" | "False" | "false" | "F" | "no" | "No" | "NO" | "0" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_number(column: &str, value: &str) -> AggregateResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| AggregateError::NotNumeric {
            column: column.to_string(),
            value: value.to_string(),
        })
}

/// Options shared by every group-wise summary.
#[derive(Debug, Clone, Default)]
pub struct GroupOptions {
    /// Groups with fewer members are dropped.
    pub min_group_size: Option<usize>,
    /// Output order.
    pub sort: SortOrder,
    /// Label-table column holding the group's display color.
    pub color_column: Option<String>,
    /// Label-table column holding the group's numeric sort key.
    pub order_column: Option<String>,
}

/// Row indices sharing one grouping value, in first-appearance order.
#[derive(Debug, Clone)]
pub(crate) struct RowGroup {
    pub value: String,
    pub rows: Vec<usize>,
    pub color: Option<String>,
    pub sort_key: Option<f64>,
}

/// Partitions rows by `key`, skipping rows whose key is missing.
pub(crate) fn group_rows(
    records: &Table,
    key: &str,
    options: &GroupOptions,
) -> AggregateResult<Vec<RowGroup>> {
    let key_idx = records.column_index(key)?;
    let color_idx = options
        .color_column
        .as_deref()
        .map(|c| records.column_index(c))
        .transpose()?;
    let order_idx = options
        .order_column
        .as_deref()
        .map(|c| records.column_index(c))
        .transpose()?;

    if records.is_empty() {
        return Err(AggregateError::SchemaMismatch(key.to_string()));
    }

    let mut groups: Vec<RowGroup> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for (row, cells) in records.rows.iter().enumerate() {
        let value = cells[key_idx].trim();
        if is_missing(value) {
            continue;
        }

        let pos = *positions.entry(value).or_insert_with(|| {
            groups.push(RowGroup {
                value: value.to_string(),
                rows: Vec::new(),
                color: None,
                sort_key: None,
            });
            groups.len() - 1
        });

        let group = &mut groups[pos];
        group.rows.push(row);

        if group.color.is_none() {
            if let Some(idx) = color_idx {
                let color = cells[idx].trim();
                if !is_missing(color) {
                    group.color = Some(color.to_string());
                }
            }
        }
        if group.sort_key.is_none() {
            if let Some(idx) = order_idx {
                group.sort_key = cells[idx].trim().parse::<f64>().ok();
            }
        }
    }

    Ok(groups)
}

/// Stable ordering of summary rows.
///
/// `stat` is the statistic sorted on for ascending/descending; `sort_key`
/// is used for label order, with keyless groups last.
pub(crate) fn order_by<T>(
    items: &mut [T],
    sort: SortOrder,
    stat: impl Fn(&T) -> f64,
    sort_key: impl Fn(&T) -> Option<f64>,
) {
    match sort {
        SortOrder::Ascending => items.sort_by(|a, b| stat(a).total_cmp(&stat(b))),
        SortOrder::Descending => items.sort_by(|a, b| stat(b).total_cmp(&stat(a))),
        SortOrder::Label => items.sort_by(|a, b| match (sort_key(a), sort_key(b)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }),
    }
}

/// Safe ratio; a zero denominator is an error.
pub fn proportion(numerator: usize, denominator: usize, what: &str) -> AggregateResult<f64> {
    if denominator == 0 {
        return Err(AggregateError::DivisionByZero(what.to_string()));
    }
    Ok(numerator as f64 / denominator as f64)
}

/// Summarizes `predicate` over `predicate_column` for each value of `key`.
///
/// Rows with a missing key are skipped. Groups with fewer than
/// `min_group_size` members are dropped, the rest are ordered by
/// proportion (or label key) and ranked from 1.
pub fn summarize_proportions(
    records: &Table,
    key: &str,
    predicate_column: &str,
    predicate: &Predicate,
    options: &GroupOptions,
) -> AggregateResult<Vec<GroupSummary>> {
    let pred_idx = records.column_index(predicate_column)?;
    let groups = group_rows(records, key, options)?;

    let mut summaries = Vec::with_capacity(groups.len());
    for group in groups {
        let total = group.rows.len();
        if options.min_group_size.is_some_and(|min| total < min) {
            continue;
        }

        let mut count_true = 0;
        for &row in &group.rows {
            if predicate.evaluate(predicate_column, records.cell(row, pred_idx))? {
                count_true += 1;
            }
        }

        summaries.push(GroupSummary {
            proportion: proportion(count_true, total, &group.value)?,
            label: GroupSummary::format_label(count_true, total),
            group: group.value,
            color: group.color,
            sort_key: group.sort_key,
            count_true,
            total,
            rank: 0,
        });
    }

    if summaries.is_empty() {
        return Err(AggregateError::EmptyResult(key.to_string()));
    }

    order_by(&mut summaries, options.sort, |s| s.proportion, |s| s.sort_key);
    for (i, summary) in summaries.iter_mut().enumerate() {
        summary.rank = i + 1;
    }

    Ok(summaries)
}
