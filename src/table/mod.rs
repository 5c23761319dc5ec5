//! Tab-separated table loading and joining.
//!
//! Input tables are whole-file, header-first TSV exports. They are read
//! into memory as [`Table`] values and joined on the sample identifier.

use crate::analysis::aggregator::parse_number;
use crate::analysis::error::{AggregateError, AggregateResult};
use crate::models::{is_missing, Table};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Suffix appended to label columns whose name clashes with a fact column.
pub const LABEL_SUFFIX: &str = ".label";

/// Reads a header-first TSV table from any reader.
pub fn read_tsv_from_reader<R: Read>(reader: R) -> Result<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b'\t')
        .quoting(false)
        .from_reader(reader);

    let columns: Vec<String> = rdr
        .headers()
        .context("Failed to read table header")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut table = Table::new(columns);
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Malformed row {}", line + 2))?;
        table.rows.push(record.iter().map(String::from).collect());
    }

    Ok(table)
}

/// Reads a TSV file into a table.
pub fn read_tsv(path: &Path) -> Result<Table> {
    let file =
        File::open(path).with_context(|| format!("Failed to open table: {}", path.display()))?;
    let table = read_tsv_from_reader(file)
        .with_context(|| format!("Failed to parse table: {}", path.display()))?;

    debug!(
        "Read {} rows x {} columns from {}",
        table.len(),
        table.columns.len(),
        path.display()
    );
    Ok(table)
}

/// Reads a sample x signature exposure matrix.
///
/// The first column holds sample identifiers; every other cell must be
/// numeric or missing.
pub fn read_exposure_matrix(path: &Path) -> Result<Table> {
    let table = read_tsv(path)?;
    validate_matrix(&table)
        .with_context(|| format!("Invalid exposure matrix: {}", path.display()))?;
    Ok(table)
}

fn validate_matrix(table: &Table) -> AggregateResult<()> {
    if table.columns.len() < 2 {
        return Err(AggregateError::MissingColumn(
            "at least one signature column".to_string(),
        ));
    }
    for row in &table.rows {
        for (column, cell) in table.columns.iter().zip(row).skip(1) {
            if !is_missing(cell) {
                parse_number(column, cell)?;
            }
        }
    }
    Ok(())
}

/// Inner join of `facts` with `labels` on `key`.
///
/// Fact columns come first, followed by every label column except the key.
/// Fact rows without a label are dropped; fact row order is preserved.
/// Each identifier may appear at most once in `labels`. Rows with a missing
/// identifier never join.
pub fn inner_join(facts: &Table, labels: &Table, key: &str) -> AggregateResult<Table> {
    let fact_key = facts.column_index(key)?;
    let label_key = labels.column_index(key)?;

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(labels.len());
    for (i, row) in labels.rows.iter().enumerate() {
        let id = row[label_key].trim();
        if is_missing(id) {
            continue;
        }
        if index.insert(id, i).is_some() {
            return Err(AggregateError::DuplicateKey(id.to_string()));
        }
    }

    let mut columns = facts.columns.clone();
    let label_columns: Vec<usize> = (0..labels.columns.len())
        .filter(|&i| i != label_key)
        .collect();
    for &i in &label_columns {
        let name = &labels.columns[i];
        if facts.has_column(name) {
            columns.push(format!("{}{}", name, LABEL_SUFFIX));
        } else {
            columns.push(name.clone());
        }
    }

    let mut joined = Table::new(columns);
    for row in &facts.rows {
        let id = row[fact_key].trim();
        if is_missing(id) {
            continue;
        }
        let Some(&label_row) = index.get(id) else {
            continue;
        };
        let mut out = row.clone();
        out.extend(
            label_columns
                .iter()
                .map(|&i| labels.rows[label_row][i].clone()),
        );
        joined.rows.push(out);
    }

    if joined.is_empty() {
        return Err(AggregateError::SchemaMismatch(key.to_string()));
    }

    debug!(
        "Joined {} of {} rows on {}",
        joined.len(),
        facts.len(),
        key
    );
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn labels() -> Table {
        Table::from_rows(
            &["Kids_First_Biospecimen_ID", "display_group", "hex_codes"],
            &[
                &["BS_1", "HGG", "#b5152a"],
                &["BS_2", "LGG", "#8f8fbf"],
                &["BS_9", "Ependymoma", "#2200ff"],
            ],
        )
    }

    #[test]
    fn test_read_tsv_from_reader() {
        let data = "id\tgroup\tevent\ns1\tA\tTRUE\ns2\tB\tFALSE\n";
        let table = read_tsv_from_reader(data.as_bytes()).unwrap();
        assert_eq!(table.columns, vec!["id", "group", "event"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, 2), "FALSE");
    }

    #[test]
    fn test_read_tsv_rejects_ragged_rows() {
        let data = "id\tgroup\ns1\tA\textra\n";
        assert!(read_tsv_from_reader(data.as_bytes()).is_err());
    }

    #[test]
    fn test_read_tsv_missing_file() {
        let err = read_tsv(Path::new("does/not/exist.tsv")).unwrap_err();
        assert!(err.to_string().contains("does/not/exist.tsv"));
    }

    #[test]
    fn test_read_exposure_matrix() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("good.tsv");
        let bad = temp_dir.path().join("bad.tsv");
        std::fs::write(&good, "id\tSBS1\tSBS5\ns1\t0.2\tNA\n").unwrap();
        let mut file = File::create(&bad).unwrap();
        writeln!(file, "id\tSBS1\ns1\tlots").unwrap();

        let table = read_exposure_matrix(&good).unwrap();
        assert_eq!(table.columns, vec!["id", "SBS1", "SBS5"]);
        assert!(read_exposure_matrix(&bad).is_err());
    }

    #[test]
    fn test_inner_join_drops_unlabeled_samples() {
        let facts = Table::from_rows(
            &["Kids_First_Biospecimen_ID", "any_regions_logical"],
            &[&["BS_2", "TRUE"], &["BS_3", "FALSE"], &["BS_1", "FALSE"]],
        );
        let joined = inner_join(&facts, &labels(), "Kids_First_Biospecimen_ID").unwrap();

        assert_eq!(
            joined.columns,
            vec![
                "Kids_First_Biospecimen_ID",
                "any_regions_logical",
                "display_group",
                "hex_codes"
            ]
        );
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.rows[0], vec!["BS_2", "TRUE", "LGG", "#8f8fbf"]);
        assert_eq!(joined.rows[1][2], "HGG");
    }

    #[test]
    fn test_inner_join_suffixes_clashing_columns() {
        let facts = Table::from_rows(
            &["Kids_First_Biospecimen_ID", "display_group"],
            &[&["BS_1", "old"]],
        );
        let joined = inner_join(&facts, &labels(), "Kids_First_Biospecimen_ID").unwrap();
        assert!(joined.has_column("display_group.label"));
        assert_eq!(joined.rows[0][1], "old");
        assert_eq!(joined.rows[0][2], "HGG");
    }

    #[test]
    fn test_inner_join_no_overlap_is_schema_mismatch() {
        let facts = Table::from_rows(&["Kids_First_Biospecimen_ID", "x"], &[&["BS_7", "1"]]);
        let err = inner_join(&facts, &labels(), "Kids_First_Biospecimen_ID").unwrap_err();
        assert_eq!(
            err,
            AggregateError::SchemaMismatch("Kids_First_Biospecimen_ID".to_string())
        );
    }

    #[test]
    fn test_inner_join_duplicate_label() {
        let facts = Table::from_rows(&["id", "x"], &[&["a", "1"]]);
        let labels = Table::from_rows(&["id", "group"], &[&["a", "G1"], &["a", "G2"]]);
        assert_eq!(
            inner_join(&facts, &labels, "id").unwrap_err(),
            AggregateError::DuplicateKey("a".to_string())
        );
    }

    #[test]
    fn test_inner_join_ignores_missing_ids() {
        let facts = Table::from_rows(&["id", "x"], &[&["NA", "1"], &["a", "2"], &["", "3"]]);
        let labels = Table::from_rows(
            &["id", "group"],
            &[&["NA", "G0"], &["", "G0"], &["NA", "G0"], &["a", "G1"]],
        );
        let joined = inner_join(&facts, &labels, "id").unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.rows[0], vec!["a", "2", "G1"]);
    }

    #[test]
    fn test_inner_join_missing_key_column() {
        let facts = Table::from_rows(&["sample", "x"], &[&["a", "1"]]);
        assert_eq!(
            inner_join(&facts, &labels(), "Kids_First_Biospecimen_ID").unwrap_err(),
            AggregateError::MissingColumn("Kids_First_Biospecimen_ID".to_string())
        );
    }
}
