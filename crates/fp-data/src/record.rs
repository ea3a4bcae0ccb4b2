//! Records and their identifiers

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

static NULL: Value = Value::Null;

/// Stable record identifier. Ids are 1-based; zero means "not yet assigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    pub const UNASSIGNED: RecordId = RecordId(0);

    pub fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        RecordId(id)
    }
}

/// One row of the dataset: an ordered mapping from field name to value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    id: RecordId,
    #[serde(flatten)]
    fields: IndexMap<String, Value>,
}

impl Record {
    /// Create an empty record; the store assigns its id on insertion
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record with a source-provided id
    pub fn with_id(id: u64) -> Self {
        Self {
            id: RecordId(id),
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }

    /// Value of a field, [`Value::Null`] when the field is absent
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&NULL)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            id: RecordId::UNASSIGNED,
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_field_is_null() {
        let record = Record::new().with("age", 20);
        assert_eq!(record.get("age"), &Value::Number(20.0));
        assert_eq!(record.get("city"), &Value::Null);
        assert!(!record.id().is_assigned());
    }

    #[test]
    fn test_record_json_shape() {
        let record = Record::with_id(7).with("city", "A");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"id": 7, "city": "A"}));
        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
