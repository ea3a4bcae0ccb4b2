//! Column schema inference and per-column statistics

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::value::{Key, Value};

/// Column data types understood by widgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Integer,
    Double,
    Date,
}

impl ColumnType {
    /// Type implied by a single value; `None` for missing values
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) if !n.is_finite() => None,
            Value::Number(n) if n.fract() == 0.0 => Some(ColumnType::Integer),
            Value::Number(_) => Some(ColumnType::Double),
            Value::Bool(_) => Some(ColumnType::Integer),
            Value::Date(_) => Some(ColumnType::Date),
            Value::Text(s) if s.is_empty() => None,
            Value::Text(_) => Some(ColumnType::Text),
        }
    }

    /// Widen two observed types to one that holds both
    pub fn widen(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Double) | (Double, Integer) => Double,
            _ => Text,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Double)
    }
}

/// A column description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub field: String,
    pub name: String,
    pub datatype: ColumnType,
}

impl Column {
    pub fn new(field: impl Into<String>, name: impl Into<String>, datatype: ColumnType) -> Self {
        Self {
            field: field.into(),
            name: name.into(),
            datatype,
        }
    }
}

/// The set of known columns, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct Schema {
    columns: IndexMap<String, Column>,
    /// Fields whose type was declared rather than inferred
    declared: Vec<String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the declared columns. Inferred columns for other fields are kept.
    pub fn set_columns(&mut self, columns: Vec<Column>) {
        self.declared.clear();
        for column in columns {
            self.declared.push(column.field.clone());
            self.columns.insert(column.field.clone(), column);
        }
    }

    /// Fold the fields of newly inserted records into the schema
    pub fn observe(&mut self, record: &Record) {
        for (field, value) in record.fields() {
            let observed = ColumnType::of(value);
            match self.columns.get_mut(field) {
                Some(column) => {
                    if self.declared.iter().any(|d| d == field) {
                        continue;
                    }
                    if let Some(t) = observed {
                        column.datatype = column.datatype.widen(t);
                    }
                }
                None => {
                    let column = Column::new(field, field, observed.unwrap_or(ColumnType::Text));
                    self.columns.insert(field.to_string(), column);
                }
            }
        }
    }

    pub fn column(&self, field: &str) -> Option<&Column> {
        self.columns.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.columns.contains_key(field)
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    pub fn remove(&mut self, field: &str) -> Option<Column> {
        self.declared.retain(|d| d != field);
        self.columns.shift_remove(field)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Statistics about a column
#[derive(Debug, Clone, Default)]
pub struct ColumnStats {
    pub missing_count: usize,
    pub distinct_count: usize,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

/// Numeric extent of a field, skipping missing and non-numeric values
pub fn numeric_extent<'a>(records: impl IntoIterator<Item = &'a Record>, field: &str) -> Option<(f64, f64)> {
    records
        .into_iter()
        .filter_map(|r| r.get(field).as_f64())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Date extent of a field
pub fn date_extent<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    field: &str,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    records
        .into_iter()
        .filter_map(|r| r.get(field).as_date())
        .fold(None, |acc, d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        })
}

/// Distinct values of a field ordered by descending frequency (ties by key)
pub fn frequencies<'a>(records: impl IntoIterator<Item = &'a Record>, field: &str) -> Vec<(Key, usize)> {
    let mut counts: HashMap<Key, usize> = HashMap::new();
    for record in records {
        let key = record.get(field).to_key();
        if key.is_missing() {
            continue;
        }
        *counts.entry(key).or_insert(0) += 1;
    }
    let mut ordered: Vec<(Key, usize)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ordered
}

/// Summary statistics of one field
pub fn column_stats<'a>(records: impl IntoIterator<Item = &'a Record> + Clone, field: &str) -> ColumnStats {
    let mut missing_count = 0;
    let mut distinct = std::collections::HashSet::new();
    for record in records.clone() {
        let key = record.get(field).to_key();
        if key.is_missing() {
            missing_count += 1;
        } else {
            distinct.insert(key);
        }
    }
    let extent = numeric_extent(records, field);
    ColumnStats {
        missing_count,
        distinct_count: distinct.len(),
        min_value: extent.map(|e| e.0),
        max_value: extent.map(|e| e.1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<Record> {
        vec![
            Record::new().with("age", 20).with("city", "A"),
            Record::new().with("age", 35.5).with("city", "B"),
            Record::new().with("age", f64::NAN).with("city", "A"),
        ]
    }

    #[test]
    fn test_inference_widens_types() {
        let mut schema = Schema::new();
        for r in &records() {
            schema.observe(r);
        }
        assert_eq!(schema.column("age").unwrap().datatype, ColumnType::Double);
        assert_eq!(schema.column("city").unwrap().datatype, ColumnType::Text);
    }

    #[test]
    fn test_declared_columns_win() {
        let mut schema = Schema::new();
        schema.set_columns(vec![Column::new("age", "Age", ColumnType::Integer)]);
        for r in &records() {
            schema.observe(r);
        }
        let age = schema.column("age").unwrap();
        assert_eq!(age.datatype, ColumnType::Integer);
        assert_eq!(age.name, "Age");
    }

    #[test]
    fn test_extent_and_frequencies_skip_missing() {
        let data = records();
        assert_eq!(numeric_extent(&data, "age"), Some((20.0, 35.5)));
        let freq = frequencies(&data, "city");
        assert_eq!(freq[0], (Key::text("A"), 2));
        let stats = column_stats(&data, "age");
        assert_eq!(stats.missing_count, 1);
        assert_eq!(stats.distinct_count, 2);
    }
}
