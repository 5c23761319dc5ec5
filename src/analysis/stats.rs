//! Numeric and categorical group statistics.

use crate::analysis::aggregator::{group_rows, order_by, parse_number, proportion, GroupOptions};
use crate::analysis::error::{AggregateError, AggregateResult};
use crate::models::{is_missing, LevelBreakdown, LevelCount, NumericSummary, Table};
use std::collections::HashMap;

/// Bases per megabase.
pub const BASES_PER_MB: f64 = 1_000_000.0;

/// Mutations per megabase of surveyed sequence.
pub fn per_megabase(count: f64, region_bp: u64) -> AggregateResult<f64> {
    if region_bp == 0 {
        return Err(AggregateError::DivisionByZero("region size".to_string()));
    }
    Ok(count / (region_bp as f64 / BASES_PER_MB))
}

/// Derives a per-megabase rate column from a count column.
///
/// Missing counts yield `NA` in the new column.
pub fn add_per_megabase_column(
    table: &mut Table,
    count_column: &str,
    region_bp: u64,
    new_column: &str,
) -> AggregateResult<()> {
    let idx = table.column_index(count_column)?;
    let mut values = Vec::with_capacity(table.len());
    for row in &table.rows {
        let cell = row[idx].as_str();
        if is_missing(cell) {
            values.push("NA".to_string());
            continue;
        }
        let rate = per_megabase(parse_number(count_column, cell)?, region_bp)?;
        values.push(rate.to_string());
    }
    table.push_column(new_column, values);
    Ok(())
}

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median, averaging the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Per-group n, mean, median, min and max of `value_column`.
///
/// Missing values are skipped; groups whose non-missing count is below the
/// threshold, or zero, are dropped. Ordering is on the median.
pub fn numeric_summary(
    records: &Table,
    key: &str,
    value_column: &str,
    options: &GroupOptions,
) -> AggregateResult<Vec<NumericSummary>> {
    let value_idx = records.column_index(value_column)?;
    let groups = group_rows(records, key, options)?;

    let mut summaries = Vec::with_capacity(groups.len());
    for group in groups {
        let mut values = Vec::with_capacity(group.rows.len());
        for &row in &group.rows {
            let cell = records.cell(row, value_idx);
            if !is_missing(cell) {
                values.push(parse_number(value_column, cell)?);
            }
        }

        let n = values.len();
        if n == 0 || options.min_group_size.is_some_and(|min| n < min) {
            continue;
        }

        let (Some(mean), Some(median)) = (mean(&values), median(&values)) else {
            continue;
        };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        summaries.push(NumericSummary {
            group: group.value,
            color: group.color,
            sort_key: group.sort_key,
            n,
            mean,
            median,
            min,
            max,
            rank: 0,
        });
    }

    if summaries.is_empty() {
        return Err(AggregateError::EmptyResult(key.to_string()));
    }

    order_by(&mut summaries, options.sort, |s| s.median, |s| s.sort_key);
    for (i, summary) in summaries.iter_mut().enumerate() {
        summary.rank = i + 1;
    }

    Ok(summaries)
}

/// Per-group counts and fractions of each level of `level_column`.
///
/// Levels are listed in the order they first appear in the table, so every
/// group reports the same level sequence (absent levels count 0). Missing
/// level cells are counted under `NA`.
pub fn level_breakdown(
    records: &Table,
    key: &str,
    level_column: &str,
    options: &GroupOptions,
) -> AggregateResult<Vec<LevelBreakdown>> {
    let level_idx = records.column_index(level_column)?;
    let groups = group_rows(records, key, options)?;

    let mut levels: Vec<String> = Vec::new();
    for row in &records.rows {
        let level = level_name(&row[level_idx]);
        if !levels.iter().any(|l| l == level) {
            levels.push(level.to_string());
        }
    }

    let mut breakdowns = Vec::with_capacity(groups.len());
    for group in groups {
        let total = group.rows.len();
        if options.min_group_size.is_some_and(|min| total < min) {
            continue;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for &row in &group.rows {
            *counts
                .entry(level_name(records.cell(row, level_idx)))
                .or_default() += 1;
        }

        let mut level_counts = Vec::with_capacity(levels.len());
        for level in &levels {
            let count = counts.get(level.as_str()).copied().unwrap_or(0);
            level_counts.push(LevelCount {
                level: level.clone(),
                count,
                fraction: proportion(count, total, &group.value)?,
            });
        }

        breakdowns.push(LevelBreakdown {
            group: group.value,
            color: group.color,
            total,
            levels: level_counts,
        });
    }

    if breakdowns.is_empty() {
        return Err(AggregateError::EmptyResult(key.to_string()));
    }

    Ok(breakdowns)
}

fn level_name(cell: &str) -> &str {
    if is_missing(cell) {
        "NA"
    } else {
        cell.trim()
    }
}
