//! In-memory tabular data
//!
//! A [`Dataset`] is an ordered list of named columns whose cells are
//! `serde_json::Value`s. It is the unit that flows from a store read,
//! through the transformation chain, into a store write.

use crate::error::{FlowError, Result};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// A named column of cells
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Result of [`Dataset::merge`]
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub dataset: Dataset,
    /// Incoming rows that matched an existing key
    pub updated: usize,
    /// Incoming rows appended as new
    pub inserted: usize,
}

/// Ordered named columns plus an explicit row count
///
/// Invariant: every column holds exactly `row_count` values and column names
/// are unique.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    /// An empty dataset with no columns and no rows
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset from columns, checking lengths and name uniqueness
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut dataset = Self::new();
        for column in columns {
            dataset.push_column(column.name, column.values)?;
        }
        Ok(dataset)
    }

    /// Build a dataset from a header and row-major cells
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut columns: Vec<Column> = names
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect();

        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(FlowError::Data(format!(
                    "Row {} has {} cells, expected {}",
                    index,
                    row.len(),
                    columns.len()
                )));
            }
            for (column, cell) in columns.iter_mut().zip(row) {
                column.values.push(cell);
            }
        }

        Self::from_columns(columns)
    }

    /// Build a dataset from JSON objects; columns appear in first-seen order
    /// and keys missing from a record become nulls
    pub fn from_records(records: Vec<Map<String, Value>>) -> Self {
        let mut names: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for record in &records {
            for key in record.keys() {
                if seen.insert(key.clone()) {
                    names.push(key.clone());
                }
            }
        }

        let row_count = records.len();
        let mut columns: Vec<Column> = names
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(row_count)))
            .collect();

        for mut record in records {
            for column in columns.iter_mut() {
                column
                    .values
                    .push(record.remove(&column.name).unwrap_or(Value::Null));
            }
        }

        Self { columns, row_count }
    }

    /// Row-major JSON objects, one per row
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        (0..self.row_count)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[row].clone()))
                    .collect()
            })
            .collect()
    }

    /// Append a column; the first column fixes the row count of an empty dataset
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> Result<()> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(FlowError::Data(format!("Duplicate column name: {}", name)));
        }
        if self.columns.is_empty() && self.row_count == 0 {
            self.row_count = values.len();
        } else if values.len() != self.row_count {
            return Err(FlowError::Data(format!(
                "Column '{}' has {} values, expected {}",
                name,
                values.len(),
                self.row_count
            )));
        }
        self.columns.push(Column::new(name, values));
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// True when the dataset has no rows
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Cells of one row, in column order
    pub fn row(&self, index: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c.values[index]).collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&Value>> + '_ {
        (0..self.row_count).map(|index| self.row(index))
    }

    /// Keep rows whose mask entry is `true`
    pub fn retain_rows(&self, mask: &[bool]) -> Dataset {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let values = c
                    .values
                    .iter()
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(v, _)| v.clone())
                    .collect();
                Column::new(c.name.clone(), values)
            })
            .collect();
        let row_count = mask.iter().take(self.row_count).filter(|k| **k).count();
        Dataset { columns, row_count }
    }

    /// Project onto `names`, in the given order; unknown names are ignored
    pub fn select(&self, names: &[String]) -> Dataset {
        let columns = names
            .iter()
            .filter_map(|name| self.column(name).cloned())
            .collect();
        Dataset {
            columns,
            row_count: self.row_count,
        }
    }

    /// Rename columns through `f`, rejecting results with duplicate names
    pub fn map_column_names(&self, mut f: impl FnMut(&str) -> String) -> Result<Dataset> {
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let name = f(&column.name);
            if !seen.insert(name.clone()) {
                return Err(FlowError::Data(format!(
                    "Renaming produces duplicate column name: {}",
                    name
                )));
            }
            columns.push(Column::new(name, column.values.clone()));
        }
        Ok(Dataset {
            columns,
            row_count: self.row_count,
        })
    }

    /// Rename columns by an old-name → new-name map (applied simultaneously)
    pub fn rename(&self, mapping: &HashMap<String, String>) -> Result<Dataset> {
        self.map_column_names(|name| mapping.get(name).cloned().unwrap_or_else(|| name.to_string()))
    }

    /// Apply `f` to every cell
    pub fn map_values(&mut self, mut f: impl FnMut(&mut Value)) {
        for column in self.columns.iter_mut() {
            column.values.iter_mut().for_each(&mut f);
        }
    }

    /// Stable identity of a row over the given column indices
    fn row_key(&self, row: usize, indices: &[usize]) -> String {
        indices
            .iter()
            .map(|&i| cell_key(&self.columns[i].values[row]))
            .collect::<Vec<_>>()
            .join("\u{1f}")
    }

    /// Key over all columns, used for exact-duplicate detection
    pub fn full_row_key(&self, row: usize) -> String {
        let indices: Vec<usize> = (0..self.columns.len()).collect();
        self.row_key(row, &indices)
    }

    /// Rows of `self` followed by rows of `other`; the column set is the
    /// union of both, missing cells are null
    pub fn concat(&self, other: &Dataset) -> Dataset {
        let mut result = self.clone();
        for column in &other.columns {
            if !result.has_column(&column.name) {
                result
                    .columns
                    .push(Column::new(column.name.clone(), vec![Value::Null; self.row_count]));
            }
        }
        for column in result.columns.iter_mut() {
            match other.column(&column.name) {
                Some(incoming) => column.values.extend(incoming.values.iter().cloned()),
                None => column
                    .values
                    .extend(std::iter::repeat_n(Value::Null, other.row_count)),
            }
        }
        result.row_count = self.row_count + other.row_count;
        result
    }

    /// Key-based merge of `incoming` into `self`
    ///
    /// Rows whose `keys` match an existing row overwrite that row's cells for
    /// every incoming column. Non-matching rows are appended when
    /// `insert_new` is set and dropped otherwise.
    pub fn merge(
        &self,
        incoming: &Dataset,
        keys: &[String],
        insert_new: bool,
    ) -> Result<MergeOutcome> {
        if keys.is_empty() {
            return Err(FlowError::Data("Merge requires at least one key column".into()));
        }
        for key in keys {
            if !self.has_column(key) && !self.is_empty() {
                return Err(FlowError::Data(format!(
                    "Key column '{}' missing from existing data",
                    key
                )));
            }
            if !incoming.has_column(key) {
                return Err(FlowError::Data(format!(
                    "Key column '{}' missing from incoming data",
                    key
                )));
            }
        }

        // Start from the existing rows with the union of both column sets
        let mut result = self.concat(&Dataset {
            columns: incoming
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), Vec::new()))
                .collect(),
            row_count: 0,
        });

        let result_keys: Vec<usize> = keys
            .iter()
            .filter_map(|k| result.column_index(k))
            .collect();
        let incoming_keys: Vec<usize> = keys
            .iter()
            .filter_map(|k| incoming.column_index(k))
            .collect();

        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for row in 0..result.row_count {
            index
                .entry(result.row_key(row, &result_keys))
                .or_default()
                .push(row);
        }

        // incoming column position → result column position
        let targets: Vec<usize> = incoming
            .columns
            .iter()
            .filter_map(|c| result.column_index(&c.name))
            .collect();

        let mut updated = 0;
        let mut inserted = 0;
        for row in 0..incoming.row_count {
            let key = incoming.row_key(row, &incoming_keys);
            if let Some(matches) = index.get(&key) {
                updated += 1;
                for &existing_row in matches {
                    for (source, &target) in targets.iter().enumerate() {
                        result.columns[target].values[existing_row] =
                            incoming.columns[source].values[row].clone();
                    }
                }
            } else if insert_new {
                let new_row = result.row_count;
                for column in result.columns.iter_mut() {
                    column.values.push(Value::Null);
                }
                for (source, &target) in targets.iter().enumerate() {
                    result.columns[target].values[new_row] =
                        incoming.columns[source].values[row].clone();
                }
                result.row_count += 1;
                inserted += 1;
                index.insert(key, vec![new_row]);
            }
        }

        Ok(MergeOutcome {
            dataset: result,
            updated,
            inserted,
        })
    }
}

/// Canonical text for a cell so `1` and `1.0` compare equal as keys
fn cell_key(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn people() -> Dataset {
        Dataset::from_rows(
            vec!["id".into(), "name".into()],
            vec![
                vec![json!(1), json!("ada")],
                vec![json!(2), json!("grace")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_checks_width() {
        let result = Dataset::from_rows(vec!["a".into()], vec![vec![json!(1), json!(2)]]);
        assert!(result.is_err());
    }

    #[test]
    fn test_push_column_length_mismatch() {
        let mut data = people();
        assert!(data.push_column("age", vec![json!(1)]).is_err());
        assert!(data.push_column("name", vec![json!(1), json!(2)]).is_err());
        data.push_column("age", vec![json!(36), json!(85)]).unwrap();
        assert_eq!(data.column_names(), vec!["id", "name", "age"]);
    }

    #[test]
    fn test_records_preserve_first_seen_order() {
        let records = vec![
            json!({"b": 1, "a": 2}).as_object().unwrap().clone(),
            json!({"a": 3, "c": 4}).as_object().unwrap().clone(),
        ];
        let data = Dataset::from_records(records);
        assert_eq!(data.column_names(), vec!["b", "a", "c"]);
        assert_eq!(data.row_count(), 2);
        assert_eq!(data.column("b").unwrap().values, vec![json!(1), Value::Null]);
        assert_eq!(data.to_records()[1]["c"], json!(4));
    }

    #[test]
    fn test_retain_and_select() {
        let data = people();
        let kept = data.retain_rows(&[false, true]);
        assert_eq!(kept.row_count(), 1);
        assert_eq!(kept.row(0), vec![&json!(2), &json!("grace")]);

        let projected = data.select(&["name".into(), "missing".into()]);
        assert_eq!(projected.column_names(), vec!["name"]);
        assert_eq!(projected.row_count(), 2);
    }

    #[test]
    fn test_rename_swaps_and_rejects_duplicates() {
        let data = people();
        let swap: HashMap<String, String> = [("id", "name"), ("name", "id")]
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        let swapped = data.rename(&swap).unwrap();
        assert_eq!(swapped.column_names(), vec!["name", "id"]);

        let clash: HashMap<String, String> = [("id".to_string(), "name".to_string())].into();
        assert!(data.rename(&clash).is_err());
    }

    #[test]
    fn test_concat_unions_columns() {
        let left = people();
        let right = Dataset::from_rows(
            vec!["id".into(), "email".into()],
            vec![vec![json!(3), json!("x@example.com")]],
        )
        .unwrap();

        let combined = left.concat(&right);
        assert_eq!(combined.row_count(), 3);
        assert_eq!(combined.column_names(), vec!["id", "name", "email"]);
        assert_eq!(combined.column("email").unwrap().values[0], Value::Null);
        assert_eq!(combined.column("name").unwrap().values[2], Value::Null);
    }

    #[test]
    fn test_merge_upsert_updates_and_inserts() {
        let existing = people();
        let incoming = Dataset::from_rows(
            vec!["id".into(), "name".into()],
            vec![
                vec![json!(2.0), json!("hopper")],
                vec![json!(3), json!("katherine")],
            ],
        )
        .unwrap();

        let outcome = existing.merge(&incoming, &["id".into()], true).unwrap();
        assert_eq!((outcome.updated, outcome.inserted), (1, 1));
        let merged = outcome.dataset;
        assert_eq!(merged.row_count(), 3);
        assert_eq!(merged.column("name").unwrap().values[1], json!("hopper"));
        assert_eq!(merged.column("name").unwrap().values[2], json!("katherine"));

        let outcome = existing.merge(&incoming, &["id".into()], false).unwrap();
        assert_eq!((outcome.updated, outcome.inserted), (1, 0));
        let updated_only = outcome.dataset;
        assert_eq!(updated_only.row_count(), 2);
        assert_eq!(updated_only.column("name").unwrap().values[1], json!("hopper"));
    }

    #[test]
    fn test_merge_requires_key_columns() {
        let existing = people();
        assert!(existing.merge(&people(), &[], true).is_err());
        assert!(existing.merge(&people(), &["missing".into()], true).is_err());
    }

    #[test]
    fn test_full_row_key_detects_duplicates() {
        let data = Dataset::from_rows(
            vec!["a".into()],
            vec![vec![json!(1)], vec![json!(1.0)], vec![json!("1")]],
        )
        .unwrap();
        assert_eq!(data.full_row_key(0), data.full_row_key(1));
        assert_ne!(data.full_row_key(0), data.full_row_key(2));
    }
}
