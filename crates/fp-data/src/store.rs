//! Append-only record store

use std::ops::Range;

use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};

use crate::record::{Record, RecordId};
use crate::schema::{self, Column, ColumnStats, Schema};
use crate::value::Key;
use crate::DataError;

/// The dataset: records in insertion order with stable ids
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<Record>,
    positions: AHashMap<RecordId, usize>,
    next_id: u64,
    schema: Schema,
}

impl RecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    /// Create a store holding `records`
    pub fn from_records(records: Vec<Record>) -> Result<Self, DataError> {
        let mut store = Self::new();
        store.append(records)?;
        Ok(store)
    }

    /// Append records, assigning ids to those without one.
    ///
    /// The batch is validated before anything is inserted, so a duplicate id
    /// leaves the store unchanged. Returns the positions of the new records.
    pub fn append(&mut self, records: Vec<Record>) -> Result<Range<usize>, DataError> {
        let mut seen = AHashSet::new();
        for record in &records {
            let id = record.id();
            if id.is_assigned() && (self.positions.contains_key(&id) || !seen.insert(id)) {
                return Err(DataError::DuplicateId(id));
            }
        }

        let start = self.records.len();
        let mut next_id = self.next_id.max(1);
        for id in &seen {
            next_id = next_id.max(id.0 + 1);
        }

        for mut record in records {
            if !record.id().is_assigned() {
                while self.positions.contains_key(&RecordId(next_id)) || seen.contains(&RecordId(next_id)) {
                    next_id += 1;
                }
                record.assign_id(RecordId(next_id));
                next_id += 1;
            }
            self.schema.observe(&record);
            self.positions.insert(record.id(), self.records.len());
            self.records.push(record);
        }
        self.next_id = next_id;

        tracing::debug!("Appended {} records (total {})", self.records.len() - start, self.records.len());
        Ok(start..self.records.len())
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Read-only view of every record in insertion order
    pub fn snapshot(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.positions.get(&id).map(|&pos| &self.records[pos])
    }

    /// Position of a record in insertion order
    pub fn position(&self, id: RecordId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn record_at(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn columns(&self) -> Vec<Column> {
        self.schema.columns().cloned().collect()
    }

    pub fn set_columns(&mut self, columns: Vec<Column>) {
        self.schema.set_columns(columns);
    }

    /// Forget a column; record values are left in place
    pub fn remove_column(&mut self, field: &str) -> Option<Column> {
        self.schema.remove(field)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.schema.contains(field)
    }

    /// Fail with [`DataError::UnknownField`] unless `field` is a known column
    pub fn require_field(&self, field: &str) -> Result<&Column, DataError> {
        self.schema
            .column(field)
            .ok_or_else(|| DataError::UnknownField(field.to_string()))
    }

    pub fn min_max(&self, field: &str) -> Option<(f64, f64)> {
        schema::numeric_extent(&self.records, field)
    }

    pub fn min_max_date(&self, field: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        schema::date_extent(&self.records, field)
    }

    pub fn frequencies(&self, field: &str) -> Vec<(Key, usize)> {
        schema::frequencies(&self.records, field)
    }

    pub fn column_stats(&self, field: &str) -> ColumnStats {
        schema::column_stats(&self.records, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_one_based_in_insertion_order() {
        let store = RecordStore::from_records(vec![
            Record::new().with("age", 20),
            Record::new().with("age", 35),
        ])
        .unwrap();
        assert_eq!(store.size(), 2);
        assert_eq!(store.snapshot()[0].id(), RecordId(1));
        assert_eq!(store.position(RecordId(2)), Some(1));
    }

    #[test]
    fn test_source_ids_are_kept_and_skipped() {
        let mut store = RecordStore::new();
        store.append(vec![Record::with_id(2).with("a", 1), Record::new().with("a", 2)]).unwrap();
        let ids: Vec<_> = store.snapshot().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![RecordId(2), RecordId(3)]);
    }

    #[test]
    fn test_duplicate_id_leaves_store_untouched() {
        let mut store = RecordStore::from_records(vec![Record::with_id(1).with("a", 1)]).unwrap();
        let err = store.append(vec![Record::new().with("a", 2), Record::with_id(1)]).unwrap_err();
        assert!(matches!(err, DataError::DuplicateId(RecordId(1))));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_require_field() {
        let store = RecordStore::from_records(vec![Record::new().with("age", 20)]).unwrap();
        assert!(store.require_field("age").is_ok());
        assert!(matches!(store.require_field("height"), Err(DataError::UnknownField(_))));
    }
}
