//! Unveränderliche Merkmalstabelle, auf der Clustering und Indizes arbeiten.
//!
//! Eine [`FeatureTable`] ist eine zeilenweise gespeicherte `f64`-Matrix mit
//! benannten Spalten. Sie wird einmal aufgebaut, dabei validiert und danach
//! nie mehr verändert; mehrere Umgebungen können sie über `Arc` teilen.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::io::{BufRead, Read};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("table has no columns")]
    NoColumns,
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
    #[error("row {row} has {found} values, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("non-finite value in row {row}, column '{column}'")]
    NonFinite { row: usize, column: String },
    #[error("column index {index} out of range ({n_features} columns)")]
    ColumnOutOfRange { index: usize, n_features: usize },
    #[error("line {line}: {reason}")]
    Record { line: usize, reason: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialisierte Form einer Tabelle: `{"columns": [...], "rows": [[...], ...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableFile {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

/// Numerische Matrix (n_samples × n_features) mit benannten Spalten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableFile", into = "TableFile")]
pub struct FeatureTable {
    columns: Vec<String>,
    /// Zeilenweise abgelegte Werte, Länge `n_samples * columns.len()`.
    data: Vec<f64>,
}

impl FeatureTable {
    /// Baut eine Tabelle und prüft Spaltennamen, Zeilenlängen und Endlichkeit.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, TableError> {
        if columns.is_empty() {
            return Err(TableError::NoColumns);
        }
        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }

        let width = columns.len();
        let mut data = Vec::with_capacity(rows.len() * width);
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(TableError::RaggedRow {
                    row: row_idx,
                    expected: width,
                    found: row.len(),
                });
            }
            if let Some(col) = row.iter().position(|v| !v.is_finite()) {
                return Err(TableError::NonFinite {
                    row: row_idx,
                    column: columns[col].clone(),
                });
            }
            data.extend(row);
        }

        Ok(Self { columns, data })
    }

    /// Liest das Tabellenformat `{"columns": [...], "rows": [[...]]}`.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let file: TableFile = serde_json::from_reader(reader)?;
        Self::try_from(file)
    }

    /// Liest JSONL: pro Zeile ein Objekt `{"spalte": zahl, ...}`.
    ///
    /// Die Spaltenreihenfolge ergibt sich aus den sortierten Schlüsseln des
    /// ersten Datensatzes; alle weiteren müssen dieselben Schlüssel tragen.
    /// Leere Zeilen werden übersprungen.
    pub fn from_jsonl_reader<R: BufRead>(reader: R) -> Result<Self, TableError> {
        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let line_no = idx + 1;
            let record: BTreeMap<String, Value> = serde_json::from_str(&line)?;

            let cols = columns.get_or_insert_with(|| record.keys().cloned().collect());
            if record.len() != cols.len() {
                return Err(TableError::Record {
                    line: line_no,
                    reason: format!("expected {} fields, found {}", cols.len(), record.len()),
                });
            }

            let mut row = Vec::with_capacity(cols.len());
            for name in cols.iter() {
                let value = record.get(name).ok_or_else(|| TableError::Record {
                    line: line_no,
                    reason: format!("missing column '{name}'"),
                })?;
                let number = value.as_f64().ok_or_else(|| TableError::Record {
                    line: line_no,
                    reason: format!("column '{name}' is not a number"),
                })?;
                row.push(number);
            }
            rows.push(row);
        }

        let columns = columns.ok_or(TableError::NoColumns)?;
        Self::new(columns, rows)
    }

    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.data.len() / self.columns.len()
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Panics if `i >= n_samples()`.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f64] {
        let width = self.columns.len();
        &self.data[i * width..(i + 1) * width]
    }

    #[must_use]
    pub fn value(&self, row: usize, column: usize) -> f64 {
        self.data[row * self.columns.len() + column]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data.chunks_exact(self.columns.len())
    }

    /// Projektion auf die angegebenen Spalten, in der angegebenen Reihenfolge.
    pub fn select(&self, indices: &[usize]) -> Result<Self, TableError> {
        let n_features = self.n_features();
        if let Some(&index) = indices.iter().find(|&&i| i >= n_features) {
            return Err(TableError::ColumnOutOfRange { index, n_features });
        }
        if indices.is_empty() {
            return Err(TableError::NoColumns);
        }
        let mut seen = HashSet::with_capacity(indices.len());
        if let Some(&index) = indices.iter().find(|&&i| !seen.insert(i)) {
            return Err(TableError::DuplicateColumn(self.columns[index].clone()));
        }

        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        let mut data = Vec::with_capacity(self.n_samples() * indices.len());
        for row in self.rows() {
            data.extend(indices.iter().map(|&i| row[i]));
        }
        Ok(Self { columns, data })
    }
}

impl TryFrom<TableFile> for FeatureTable {
    type Error = TableError;

    fn try_from(file: TableFile) -> Result<Self, Self::Error> {
        Self::new(file.columns, file.rows)
    }
}

impl From<FeatureTable> for TableFile {
    fn from(table: FeatureTable) -> Self {
        let rows = table.rows().map(<[f64]>::to_vec).collect();
        Self {
            columns: table.columns,
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| (*c).to_string()).collect()
    }

    #[test]
    fn new_rejects_ragged_rows() {
        let err = FeatureTable::new(names(&["a", "b"]), vec![vec![1.0, 2.0], vec![3.0]])
            .expect_err("ragged rows must fail");
        assert!(matches!(
            err,
            TableError::RaggedRow {
                row: 1,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn new_rejects_duplicates_and_non_finite() {
        assert!(matches!(
            FeatureTable::new(names(&["a", "a"]), vec![]),
            Err(TableError::DuplicateColumn(c)) if c == "a"
        ));
        assert!(matches!(
            FeatureTable::new(names(&["a", "b"]), vec![vec![1.0, f64::NAN]]),
            Err(TableError::NonFinite { row: 0, column }) if column == "b"
        ));
        assert!(matches!(
            FeatureTable::new(vec![], vec![]),
            Err(TableError::NoColumns)
        ));
    }

    #[test]
    fn select_projects_in_given_order() {
        let table = FeatureTable::new(
            names(&["a", "b", "c"]),
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap();

        let sub = table.select(&[2, 0]).unwrap();
        assert_eq!(sub.columns(), &["c".to_string(), "a".to_string()]);
        assert_eq!(sub.n_samples(), 2);
        assert_eq!(sub.row(1), &[6.0, 4.0]);
        assert!(matches!(
            table.select(&[3]),
            Err(TableError::ColumnOutOfRange {
                index: 3,
                n_features: 3
            })
        ));
    }

    #[test]
    fn select_rejects_repeated_columns() {
        let table = FeatureTable::new(names(&["a", "b"]), vec![vec![1.0, 2.0]]).unwrap();
        assert!(matches!(
            table.select(&[1, 0, 1]),
            Err(TableError::DuplicateColumn(c)) if c == "b"
        ));
        assert!(table.select(&[1, 0]).is_ok());
    }

    #[test]
    fn json_table_deserializes_with_validation() {
        let ok = json!({"columns": ["x", "y"], "rows": [[0.0, 1.0], [2.0, 3.0]]});
        let table: FeatureTable = serde_json::from_value(ok).unwrap();
        assert_eq!(table.n_features(), 2);
        #[allow(clippy::float_cmp)]
        {
            assert_eq!(table.value(1, 0), 2.0);
        }

        let ragged = json!({"columns": ["x", "y"], "rows": [[0.0]]});
        assert!(serde_json::from_value::<FeatureTable>(ragged).is_err());
    }

    #[test]
    fn jsonl_records_use_sorted_keys_and_skip_blank_lines() {
        let input = "{\"b\": 1.0, \"a\": 2.0}\n\n{\"a\": 3.0, \"b\": 4.0}\n";
        let table = FeatureTable::from_jsonl_reader(input.as_bytes()).unwrap();
        assert_eq!(table.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(table.row(0), &[2.0, 1.0]);
        assert_eq!(table.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn jsonl_rejects_mismatched_records() {
        let input = "{\"a\": 1.0, \"b\": 2.0}\n{\"a\": 1.0, \"c\": 2.0}\n";
        let err = FeatureTable::from_jsonl_reader(input.as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::Record { line: 2, .. }));

        let input = "{\"a\": \"x\"}\n";
        let err = FeatureTable::from_jsonl_reader(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("not a number"));
    }
}
