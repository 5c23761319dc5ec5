//! Mutational signature exposure summaries.
//!
//! The exposure matrix has one row per sample and one column per signature.
//! It is melted into long form, joined against the label table and
//! summarized per (group, signature).

use crate::analysis::aggregator::{order_by, summarize_proportions, GroupOptions, Predicate};
use crate::analysis::error::{AggregateError, AggregateResult};
use crate::analysis::stats::numeric_summary;
use crate::models::{is_missing, SignatureSummary, SortOrder, Table};
use crate::table::inner_join;

/// Column names used for the melted table.
pub const SIGNATURE_COLUMN: &str = "signature";
pub const EXPOSURE_COLUMN: &str = "exposure";

/// Turns a wide exposure matrix into (id, signature, exposure) rows.
///
/// The first matrix column is the sample identifier; its header is kept as
/// the identifier column name of the result. Missing exposures produce no
/// row.
pub fn melt_exposures(matrix: &Table) -> AggregateResult<Table> {
    let Some(id_column) = matrix.columns.first() else {
        return Err(AggregateError::MissingColumn("sample identifier".to_string()));
    };

    let mut long = Table::new(vec![
        id_column.clone(),
        SIGNATURE_COLUMN.to_string(),
        EXPOSURE_COLUMN.to_string(),
    ]);

    for row in &matrix.rows {
        for (signature, value) in matrix.columns.iter().zip(row).skip(1) {
            if is_missing(value) {
                continue;
            }
            long.rows
                .push(vec![row[0].clone(), signature.clone(), value.clone()]);
        }
    }

    Ok(long)
}

/// Per-group, per-signature mean exposure and share of exposed samples.
///
/// A sample counts as exposed when its exposure is strictly above
/// `threshold`. Rows are grouped by group first (in the configured group
/// order), then by signature in matrix column order.
pub fn summarize_signatures(
    matrix: &Table,
    labels: &Table,
    id_column: &str,
    key: &str,
    threshold: f64,
    options: &GroupOptions,
) -> AggregateResult<Vec<SignatureSummary>> {
    let long = melt_exposures(matrix)?;
    let joined = inner_join(&long, labels, id_column)?;

    let signatures: Vec<&String> = matrix.columns.iter().skip(1).collect();
    let exposed = Predicate::Above(threshold);
    let mut summaries = Vec::new();

    // Group order follows the median exposure over all signatures. The size
    // threshold applies per signature below.
    let group_order = numeric_summary(
        &joined,
        key,
        EXPOSURE_COLUMN,
        &GroupOptions {
            min_group_size: None,
            ..options.clone()
        },
    )?;

    for signature in signatures {
        let subset = filter_rows(&joined, SIGNATURE_COLUMN, signature)?;
        if subset.is_empty() {
            continue;
        }
        let per_signature = GroupOptions {
            sort: SortOrder::Descending,
            ..options.clone()
        };

        let means = match numeric_summary(&subset, key, EXPOSURE_COLUMN, &per_signature) {
            Ok(means) => means,
            Err(AggregateError::EmptyResult(_)) => continue,
            Err(e) => return Err(e),
        };
        let shares = summarize_proportions(&subset, key, EXPOSURE_COLUMN, &exposed, &per_signature)?;

        for share in shares {
            let Some(mean) = means.iter().find(|m| m.group == share.group) else {
                continue;
            };
            summaries.push(SignatureSummary {
                group: share.group,
                signature: signature.clone(),
                color: share.color,
                n: share.total,
                mean_exposure: mean.mean,
                count_exposed: share.count_true,
                proportion_exposed: share.proportion,
                label: share.label,
            });
        }
    }

    let signature_pos = |s: &SignatureSummary| {
        matrix
            .columns
            .iter()
            .position(|c| *c == s.signature)
            .unwrap_or(usize::MAX)
    };
    let group_pos = |s: &SignatureSummary| {
        group_order
            .iter()
            .position(|g| g.group == s.group)
            .unwrap_or(usize::MAX)
    };
    summaries.sort_by_key(|s| (group_pos(s), signature_pos(s)));

    if summaries.is_empty() {
        return Err(AggregateError::EmptyResult(key.to_string()));
    }

    Ok(summaries)
}

/// Signatures ranked by mean exposure across all samples.
pub fn rank_signatures(matrix: &Table, sort: SortOrder) -> AggregateResult<Vec<(String, f64)>> {
    let long = melt_exposures(matrix)?;
    let summaries = numeric_summary(
        &long,
        SIGNATURE_COLUMN,
        EXPOSURE_COLUMN,
        &GroupOptions::default(),
    )?;
    let mut ranked: Vec<(String, f64)> = summaries.into_iter().map(|s| (s.group, s.mean)).collect();
    order_by(&mut ranked, sort, |(_, mean)| *mean, |_| None);
    Ok(ranked)
}

fn filter_rows(table: &Table, column: &str, value: &str) -> AggregateResult<Table> {
    let idx = table.column_index(column)?;
    Ok(Table {
        columns: table.columns.clone(),
        rows: table
            .rows
            .iter()
            .filter(|r| r[idx] == value)
            .cloned()
            .collect(),
    })
}
