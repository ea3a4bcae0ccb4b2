//! Groups: incrementally maintained aggregates over a dimension

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use fp_data::{Key, Record};
use serde::Serialize;

use crate::dimension::DimensionId;
use crate::reducer::Reducer;

/// Handle of a group inside a [`crate::Crossfilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub(crate) u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// Typed handle of a group, remembering its reducer
pub struct GroupHandle<R> {
    id: GroupId,
    _reducer: PhantomData<fn() -> R>,
}

impl<R> GroupHandle<R> {
    pub(crate) fn new(id: GroupId) -> Self {
        Self {
            id,
            _reducer: PhantomData,
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }
}

impl<R> Clone for GroupHandle<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for GroupHandle<R> {}

impl<R> PartialEq for GroupHandle<R> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<R> fmt::Debug for GroupHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupHandle({})", self.id)
    }
}

/// One bucket of a group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupEntry<V> {
    pub key: Key,
    pub value: V,
}

/// Bucket key used by "group all" aggregates
pub const ALL_KEY: Key = Key::Tuple(Vec::new());

pub(crate) type GroupKeyFn = Arc<dyn Fn(&Key) -> Key + Send + Sync>;

/// Object-safe view of a group, whatever its reducer
pub(crate) trait AnyGroup: Send + Sync {
    fn dimension(&self) -> DimensionId;

    /// Create empty buckets for the keys of a record that does not pass
    fn ensure_buckets(&mut self, keys: &[Key]);

    fn add(&mut self, keys: &[Key], record: &Record);

    fn remove(&mut self, keys: &[Key], record: &Record);

    fn len(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

pub(crate) struct GroupState<R: Reducer> {
    dimension: DimensionId,
    key_fn: Option<GroupKeyFn>,
    reducer: R,
    buckets: BTreeMap<Key, R::Value>,
}

impl<R: Reducer> GroupState<R> {
    pub fn new(dimension: DimensionId, key_fn: Option<GroupKeyFn>, reducer: R) -> Self {
        Self {
            dimension,
            key_fn,
            reducer,
            buckets: BTreeMap::new(),
        }
    }

    /// Bucket keys for a record's dimension keys, each bucket at most once
    fn bucket_keys(&self, keys: &[Key]) -> Vec<Key> {
        let mut mapped: Vec<Key> = match &self.key_fn {
            Some(f) => keys.iter().map(|k| f(k)).collect(),
            None => keys.to_vec(),
        };
        if mapped.len() > 1 {
            mapped.sort();
            mapped.dedup();
        }
        mapped
    }

    pub fn entries(&self) -> Vec<GroupEntry<R::Value>> {
        self.buckets
            .iter()
            .map(|(key, value)| GroupEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }

    pub fn value(&self, key: &Key) -> Option<&R::Value> {
        self.buckets.get(key)
    }

    pub fn initial(&self) -> R::Value {
        self.reducer.initial()
    }
}

impl<R: Reducer> AnyGroup for GroupState<R> {
    fn dimension(&self) -> DimensionId {
        self.dimension
    }

    fn ensure_buckets(&mut self, keys: &[Key]) {
        for key in self.bucket_keys(keys) {
            if !self.buckets.contains_key(&key) {
                let initial = self.reducer.initial();
                self.buckets.insert(key, initial);
            }
        }
    }

    fn add(&mut self, keys: &[Key], record: &Record) {
        for key in self.bucket_keys(keys) {
            let value = self
                .buckets
                .entry(key)
                .or_insert_with(|| self.reducer.initial());
            self.reducer.add(value, record);
        }
    }

    fn remove(&mut self, keys: &[Key], record: &Record) {
        for key in self.bucket_keys(keys) {
            if let Some(value) = self.buckets.get_mut(&key) {
                self.reducer.remove(value, record);
            }
        }
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
