//! The crossfilter engine: record store, dimensions and groups under one owner

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;

use fp_data::{Column, Key, Record, RecordId, RecordStore};
use indexmap::IndexMap;

use crate::dimension::{DimensionId, DimensionState, KeyFn};
use crate::error::{FilterError, Result};
use crate::group::{AnyGroup, GroupEntry, GroupHandle, GroupId, GroupState, ALL_KEY};
use crate::mask::FilterMasks;
use crate::predicate::Predicate;
use crate::reducer::Reducer;

/// Owns the dataset and every dimension and group built over it.
///
/// All cross-dimension effects go through the engine: a predicate change on
/// one dimension updates the filter bits of the records that flipped, and the
/// groups of every other dimension are adjusted for exactly those records.
pub struct Crossfilter {
    store: RecordStore,
    masks: FilterMasks,
    dimensions: IndexMap<DimensionId, DimensionState>,
    groups: IndexMap<GroupId, Box<dyn AnyGroup>>,
    next_dimension: u32,
    next_group: u32,
}

impl Default for Crossfilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Crossfilter {
    /// Create an engine over an empty store
    pub fn new() -> Self {
        Self {
            store: RecordStore::new(),
            masks: FilterMasks::new(),
            dimensions: IndexMap::new(),
            groups: IndexMap::new(),
            next_dimension: 0,
            next_group: 0,
        }
    }

    /// Create an engine holding `records`
    pub fn from_records(records: Vec<Record>) -> Result<Self> {
        let mut engine = Self::new();
        engine.add(records)?;
        Ok(engine)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn size(&self) -> usize {
        self.store.size()
    }

    pub fn set_columns(&mut self, columns: Vec<Column>) {
        self.store.set_columns(columns);
    }

    pub fn remove_column(&mut self, field: &str) -> Option<Column> {
        self.store.remove_column(field)
    }

    /// Append records. Every dimension indexes them under its current
    /// predicate and every group receives the ones that pass for it.
    pub fn add(&mut self, records: Vec<Record>) -> Result<Range<usize>> {
        let range = self.store.append(records)?;
        if range.is_empty() {
            return Ok(range);
        }
        self.masks.grow(range.len());
        let fresh = &self.store.snapshot()[range.clone()];

        for dimension in self.dimensions.values_mut() {
            let passing = dimension.append(fresh);
            for (offset, passes) in passing.into_iter().enumerate() {
                if !passes {
                    self.masks.set(range.start + offset, dimension.slot, true);
                }
            }
        }

        for group in self.groups.values_mut() {
            let Some(dimension) = self.dimensions.get(&group.dimension()) else {
                continue;
            };
            for position in range.clone() {
                let keys = dimension.keys_of(position);
                if self.masks.passes_except(position, &[dimension.slot]) {
                    group.add(keys, &self.store.snapshot()[position]);
                } else {
                    group.ensure_buckets(keys);
                }
            }
        }

        tracing::debug!(
            "Indexed {} new records across {} dimensions",
            range.len(),
            self.dimensions.len()
        );
        Ok(range)
    }

    /// Create a dimension whose accessor yields one key per record
    pub fn dimension<F>(&mut self, key_fn: F) -> DimensionId
    where
        F: Fn(&Record) -> Key + Send + Sync + 'static,
    {
        self.insert_dimension(KeyFn::Single(Arc::new(key_fn)))
    }

    /// Create a dimension whose accessor yields a set of keys per record.
    /// A record passes when any of its keys passes.
    pub fn dimension_many<F>(&mut self, key_fn: F) -> DimensionId
    where
        F: Fn(&Record) -> Vec<Key> + Send + Sync + 'static,
    {
        self.insert_dimension(KeyFn::Many(Arc::new(key_fn)))
    }

    /// Dimension keyed by the value of one field
    pub fn field_dimension(&mut self, field: &str) -> Result<DimensionId> {
        self.store.require_field(field)?;
        let field = field.to_string();
        Ok(self.dimension(move |r| r.get(&field).to_key()))
    }

    fn insert_dimension(&mut self, key_fn: KeyFn) -> DimensionId {
        let id = DimensionId(self.next_dimension);
        self.next_dimension += 1;
        let slot = self.masks.alloc_slot();
        let state = DimensionState::new(slot, key_fn, self.store.snapshot());
        if state.missing_count() > 0 {
            tracing::trace!("{} maps {} records to the missing sentinel", id, state.missing_count());
        }
        self.dimensions.insert(id, state);
        tracing::debug!("Created {} (slot {})", id, slot);
        id
    }

    pub fn is_live(&self, dimension: DimensionId) -> bool {
        self.dimensions.contains_key(&dimension)
    }

    pub fn dimension_count(&self) -> usize {
        self.dimensions.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn live(&self, dimension: DimensionId) -> Result<&DimensionState> {
        self.dimensions
            .get(&dimension)
            .ok_or_else(|| FilterError::state(format!("{dimension} has been disposed")))
    }

    /// Replace the predicate of a dimension; `None` clears it.
    ///
    /// Returns `false` without doing any work when the predicate is
    /// equivalent to the active one.
    pub fn filter(&mut self, dimension: DimensionId, predicate: Option<Predicate>) -> Result<bool> {
        let state = self
            .dimensions
            .get_mut(&dimension)
            .ok_or_else(|| FilterError::state(format!("cannot filter {dimension}: it has been disposed")))?;
        if state.predicate() == predicate.as_ref() {
            return Ok(false);
        }

        let slot = state.slot;
        let flips = state.refilter(predicate);
        for &(position, passes) in &flips {
            self.masks.set(position, slot, !passes);
        }

        for group in self.groups.values_mut() {
            if group.dimension() == dimension {
                continue;
            }
            let Some(owner) = self.dimensions.get(&group.dimension()) else {
                continue;
            };
            for &(position, passes) in &flips {
                if !self.masks.passes_except(position, &[slot, owner.slot]) {
                    continue;
                }
                let record = &self.store.snapshot()[position];
                if passes {
                    group.add(owner.keys_of(position), record);
                } else {
                    group.remove(owner.keys_of(position), record);
                }
            }
        }

        tracing::debug!("Filtered {}: {} records changed state", dimension, flips.len());
        Ok(true)
    }

    /// The active predicate of a dimension
    pub fn predicate(&self, dimension: DimensionId) -> Result<Option<&Predicate>> {
        Ok(self.live(dimension)?.predicate())
    }

    /// Ids of the records passing every other predicate, and this
    /// dimension's own one too unless `exclude_self`
    pub fn passing_ids(&self, dimension: DimensionId, exclude_self: bool) -> Result<BTreeSet<RecordId>> {
        let own = [self.live(dimension)?.slot];
        let ignore = if exclude_self { &own[..] } else { &[] };
        Ok(self.collect_ids(ignore))
    }

    /// Ids of the records passing every predicate except those of `excluded`
    pub fn passing_ids_excluding(&self, excluded: &[DimensionId]) -> Result<BTreeSet<RecordId>> {
        let slots = excluded
            .iter()
            .map(|d| self.live(*d).map(|state| state.slot))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.collect_ids(&slots))
    }

    /// Ids of the records passing every predicate
    pub fn all_passing_ids(&self) -> BTreeSet<RecordId> {
        self.collect_ids(&[])
    }

    fn collect_ids(&self, ignore: &[usize]) -> BTreeSet<RecordId> {
        self.store
            .snapshot()
            .iter()
            .enumerate()
            .filter(|(position, _)| self.masks.passes_except(*position, ignore))
            .map(|(_, record)| record.id())
            .collect()
    }

    /// Number of records passing every predicate
    pub fn passing_count(&self) -> usize {
        (0..self.masks.len()).filter(|&p| self.masks.passes_all(p)).count()
    }

    /// The `k` passing records with the highest keys
    pub fn top(&self, dimension: DimensionId, k: usize) -> Result<Vec<&Record>> {
        let state = self.live(dimension)?;
        Ok(self.walk(state.index().iter().rev(), k))
    }

    /// The `k` passing records with the lowest keys
    pub fn bottom(&self, dimension: DimensionId, k: usize) -> Result<Vec<&Record>> {
        let state = self.live(dimension)?;
        Ok(self.walk(state.index().iter(), k))
    }

    fn walk<'a>(&'a self, entries: impl Iterator<Item = &'a (Key, u32)>, k: usize) -> Vec<&'a Record> {
        let mut seen = ahash::AHashSet::new();
        entries
            .map(|(_, position)| *position as usize)
            .filter(|&p| self.masks.passes_all(p) && seen.insert(p))
            .take(k)
            .map(|p| &self.store.snapshot()[p])
            .collect()
    }

    /// Records of a dimension whose key was missing
    pub fn missing_count(&self, dimension: DimensionId) -> Result<usize> {
        Ok(self.live(dimension)?.missing_count())
    }

    /// Dispose a dimension and its groups. An active predicate is cleared
    /// first so the other groups get the records back.
    pub fn dispose_dimension(&mut self, dimension: DimensionId) -> Result<()> {
        self.live(dimension)?;
        self.filter(dimension, None)?;
        let Some(state) = self.dimensions.shift_remove(&dimension) else {
            return Ok(());
        };
        for group in &state.groups {
            self.groups.shift_remove(group);
        }
        self.masks.release_slot(state.slot);
        tracing::debug!("Disposed {} and {} groups", dimension, state.groups.len());
        Ok(())
    }

    /// Group a dimension's records by `key_fn` of their dimension key
    pub fn group<R, F>(&mut self, dimension: DimensionId, key_fn: F, reducer: R) -> Result<GroupHandle<R>>
    where
        R: Reducer,
        F: Fn(&Key) -> Key + Send + Sync + 'static,
    {
        self.insert_group(dimension, Some(Arc::new(key_fn)), reducer)
    }

    /// Group a dimension's records by their dimension key
    pub fn group_by_key<R: Reducer>(&mut self, dimension: DimensionId, reducer: R) -> Result<GroupHandle<R>> {
        self.insert_group(dimension, None, reducer)
    }

    /// Aggregate every record passing the other dimensions into one bucket
    pub fn group_all<R: Reducer>(&mut self, dimension: DimensionId, reducer: R) -> Result<GroupHandle<R>> {
        self.insert_group(dimension, Some(Arc::new(|_: &Key| ALL_KEY)), reducer)
    }

    fn insert_group<R: Reducer>(
        &mut self,
        dimension: DimensionId,
        key_fn: Option<crate::group::GroupKeyFn>,
        reducer: R,
    ) -> Result<GroupHandle<R>> {
        let owner = self
            .dimensions
            .get(&dimension)
            .ok_or_else(|| FilterError::state(format!("cannot group {dimension}: it has been disposed")))?;

        let mut state = GroupState::new(dimension, key_fn, reducer);
        for (position, record) in self.store.snapshot().iter().enumerate() {
            let keys = owner.keys_of(position);
            if self.masks.passes_except(position, &[owner.slot]) {
                state.add(keys, record);
            } else {
                state.ensure_buckets(keys);
            }
        }

        let id = GroupId(self.next_group);
        self.next_group += 1;
        self.groups.insert(id, Box::new(state));
        if let Some(owner) = self.dimensions.get_mut(&dimension) {
            owner.groups.push(id);
        }
        tracing::debug!("Created {} on {}", id, dimension);
        Ok(GroupHandle::new(id))
    }

    fn group_state<R: Reducer>(&self, handle: &GroupHandle<R>) -> Result<&GroupState<R>> {
        let group = self
            .groups
            .get(&handle.id())
            .ok_or_else(|| FilterError::state(format!("{} has been disposed", handle.id())))?;
        group
            .as_any()
            .downcast_ref::<GroupState<R>>()
            .ok_or_else(|| FilterError::configuration(format!("{} holds a different reducer", handle.id())))
    }

    /// Buckets of a group in key order
    pub fn entries<R: Reducer>(&self, handle: &GroupHandle<R>) -> Result<Vec<GroupEntry<R::Value>>> {
        Ok(self.group_state(handle)?.entries())
    }

    /// Value of one bucket
    pub fn group_value<R: Reducer>(&self, handle: &GroupHandle<R>, key: &Key) -> Result<Option<R::Value>> {
        Ok(self.group_state(handle)?.value(key).cloned())
    }

    /// Value of a [`Crossfilter::group_all`] group
    pub fn group_all_value<R: Reducer>(&self, handle: &GroupHandle<R>) -> Result<R::Value> {
        let state = self.group_state(handle)?;
        Ok(state.value(&ALL_KEY).cloned().unwrap_or_else(|| state.initial()))
    }

    /// The `k` buckets with the largest values
    pub fn group_top<R>(&self, handle: &GroupHandle<R>, k: usize) -> Result<Vec<GroupEntry<R::Value>>>
    where
        R: Reducer,
        R::Value: PartialOrd,
    {
        let mut entries = self.entries(handle)?;
        entries.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal));
        entries.truncate(k);
        Ok(entries)
    }

    pub fn group_len(&self, group: GroupId) -> Result<usize> {
        self.groups
            .get(&group)
            .map(|g| g.len())
            .ok_or_else(|| FilterError::state(format!("{group} has been disposed")))
    }

    pub fn dispose_group(&mut self, group: GroupId) -> Result<()> {
        let removed = self
            .groups
            .shift_remove(&group)
            .ok_or_else(|| FilterError::state(format!("{group} has already been disposed")))?;
        if let Some(owner) = self.dimensions.get_mut(&removed.dimension()) {
            owner.groups.retain(|g| *g != group);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::{Count, Sum};
    use fp_data::Value;

    fn people() -> Crossfilter {
        Crossfilter::from_records(vec![
            Record::with_id(1).with("age", 20).with("city", "A"),
            Record::with_id(2).with("age", 35).with("city", "B"),
            Record::with_id(3).with("age", 50).with("city", "A"),
        ])
        .unwrap()
    }

    fn counts(engine: &Crossfilter, handle: &GroupHandle<Count>) -> Vec<(String, u64)> {
        engine
            .entries(handle)
            .unwrap()
            .into_iter()
            .map(|e| (e.key.to_string(), e.value))
            .collect()
    }

    fn ids(values: &[u64]) -> BTreeSet<RecordId> {
        values.iter().map(|v| RecordId(*v)).collect()
    }

    #[test]
    fn test_city_group_follows_age_filter() {
        let mut cf = people();
        let age = cf.field_dimension("age").unwrap();
        let city = cf.field_dimension("city").unwrap();
        let by_city = cf.group_by_key(city, Count).unwrap();

        assert!(cf.filter(age, Some(Predicate::range_inclusive(25, 60))).unwrap());
        assert_eq!(counts(&cf, &by_city), vec![("A".into(), 1), ("B".into(), 1)]);

        cf.filter(age, None).unwrap();
        assert_eq!(counts(&cf, &by_city), vec![("A".into(), 2), ("B".into(), 1)]);
    }

    #[test]
    fn test_own_predicate_is_excluded_from_own_group() {
        let mut cf = people();
        let city = cf.field_dimension("city").unwrap();
        let by_city = cf.group_by_key(city, Count).unwrap();
        cf.filter(city, Some(Predicate::set(["B"]))).unwrap();

        assert_eq!(counts(&cf, &by_city), vec![("A".into(), 2), ("B".into(), 1)]);
        assert_eq!(cf.passing_ids(city, true).unwrap(), ids(&[1, 2, 3]));
        assert_eq!(cf.passing_ids(city, false).unwrap(), ids(&[2]));
        assert_eq!(cf.passing_count(), 1);
    }

    #[test]
    fn test_predicates_combine_with_and() {
        let mut cf = people();
        let age = cf.field_dimension("age").unwrap();
        let age_cap = cf.field_dimension("age").unwrap();
        let city = cf.field_dimension("city").unwrap();
        let id = cf.dimension(|r| Key::from(r.id().0 as f64));
        let total = cf.group_all(id, Sum::new("age")).unwrap();

        cf.filter(age, Some(Predicate::range(30, 100))).unwrap();
        cf.filter(age_cap, Some(Predicate::range(0, 40))).unwrap();
        cf.filter(city, Some(Predicate::set(["B"]))).unwrap();
        assert_eq!(cf.passing_ids(id, true).unwrap(), ids(&[2]));
        assert_eq!(cf.group_all_value(&total).unwrap().value(), 35.0);

        cf.filter(city, Some(Predicate::set(["A"]))).unwrap();
        assert!(cf.passing_ids(id, true).unwrap().is_empty());
        cf.filter(age_cap, None).unwrap();
        assert_eq!(cf.passing_ids(id, true).unwrap(), ids(&[3]));
        assert_eq!(cf.group_all_value(&total).unwrap().value(), 50.0);

        cf.filter(id, Some(Predicate::range(10, 20))).unwrap();
        assert_eq!(cf.group_all_value(&total).unwrap().value(), 50.0);
        assert!(cf.all_passing_ids().is_empty());
    }

    #[test]
    fn test_fractional_sums_do_not_drift() {
        let mut cf = Crossfilter::from_records(vec![
            Record::with_id(1).with("k", "a").with("n", 1).with("v", 0.1),
            Record::with_id(2).with("k", "a").with("n", 2).with("v", 0.2),
            Record::with_id(3).with("k", "a").with("n", 3).with("v", 0.3),
        ])
        .unwrap();
        let k = cf.field_dimension("k").unwrap();
        let n = cf.field_dimension("n").unwrap();
        let by_k = cf.group_by_key(k, Sum::new("v")).unwrap();
        let value = |cf: &Crossfilter| cf.group_value(&by_k, &Key::text("a")).unwrap().unwrap().value();

        assert_eq!(value(&cf), 0.6);
        cf.filter(n, Some(Predicate::set([1]))).unwrap();
        assert_eq!(value(&cf), 0.1);

        for _ in 0..50 {
            cf.filter(n, Some(Predicate::set([2, 3]))).unwrap();
            cf.filter(n, None).unwrap();
            cf.filter(n, Some(Predicate::set([1]))).unwrap();
        }
        assert_eq!(value(&cf), 0.1);
        cf.filter(n, None).unwrap();
        assert_eq!(value(&cf), 0.6);
    }

    #[test]
    fn test_equivalent_predicate_is_a_no_op() {
        let mut cf = people();
        let age = cf.field_dimension("age").unwrap();
        assert!(cf.filter(age, Some(Predicate::range(25, 60))).unwrap());
        assert!(!cf.filter(age, Some(Predicate::range(25, 60))).unwrap());
        let custom = Predicate::custom(|k| k.as_f64().is_some_and(|v| v > 30.0));
        assert!(cf.filter(age, Some(custom.clone())).unwrap());
        assert!(!cf.filter(age, Some(custom)).unwrap());
        assert!(cf.filter(age, None).unwrap());
        assert!(!cf.filter(age, None).unwrap());
    }

    #[test]
    fn test_dispose_while_filtered_releases_records() {
        let mut cf = people();
        let age = cf.field_dimension("age").unwrap();
        let city = cf.field_dimension("city").unwrap();
        let by_city = cf.group_by_key(city, Count).unwrap();
        let by_age = cf.group_by_key(age, Count).unwrap();

        cf.filter(age, Some(Predicate::range(40, 60))).unwrap();
        cf.dispose_dimension(age).unwrap();

        assert_eq!(counts(&cf, &by_city), vec![("A".into(), 2), ("B".into(), 1)]);
        assert!(cf.entries(&by_age).unwrap_err().is_state());
        assert!(cf.filter(age, None).unwrap_err().is_state());
        assert!(cf.dispose_dimension(age).unwrap_err().is_state());
        assert_eq!(cf.dimension_count(), 1);
        assert_eq!(cf.group_count(), 1);
    }

    #[test]
    fn test_append_applies_current_predicates() {
        let mut cf = people();
        let age = cf.field_dimension("age").unwrap();
        let city = cf.field_dimension("city").unwrap();
        let by_city = cf.group_by_key(city, Count).unwrap();
        cf.filter(age, Some(Predicate::range(30, 60))).unwrap();

        cf.add(vec![
            Record::new().with("age", 40).with("city", "C"),
            Record::new().with("age", 10).with("city", "D"),
            Record::new().with("age", Value::Null).with("city", "A"),
        ])
        .unwrap();

        assert_eq!(
            counts(&cf, &by_city),
            vec![("A".into(), 1), ("B".into(), 1), ("C".into(), 1), ("D".into(), 0)]
        );
        assert_eq!(cf.passing_ids(age, false).unwrap(), ids(&[2, 3, 4]));
        assert_eq!(cf.missing_count(age).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_id_is_rejected_without_side_effects() {
        let mut cf = people();
        let err = cf.add(vec![Record::with_id(2).with("age", 1)]).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(cf.size(), 3);
    }

    #[test]
    fn test_top_and_bottom_respect_filters() {
        let mut cf = people();
        let age = cf.field_dimension("age").unwrap();
        let city = cf.field_dimension("city").unwrap();
        cf.filter(city, Some(Predicate::set(["A"]))).unwrap();

        let top: Vec<_> = cf.top(age, 5).unwrap().iter().map(|r| r.id()).collect();
        assert_eq!(top, vec![RecordId(3), RecordId(1)]);
        let bottom: Vec<_> = cf.bottom(age, 1).unwrap().iter().map(|r| r.id()).collect();
        assert_eq!(bottom, vec![RecordId(1)]);
    }

    #[test]
    fn test_split_dimension_groups_every_key() {
        let mut cf = Crossfilter::from_records(vec![
            Record::new().with("tags", "x;y").with("n", 1),
            Record::new().with("tags", "y").with("n", 2),
        ])
        .unwrap();
        let tags = cf.dimension_many(|r| {
            r.get("tags").as_str().map(|s| s.split(';').map(Key::text).collect()).unwrap_or_default()
        });
        let n = cf.field_dimension("n").unwrap();
        let by_tag = cf.group_by_key(tags, Count).unwrap();

        assert_eq!(counts(&cf, &by_tag), vec![("x".into(), 1), ("y".into(), 2)]);
        cf.filter(n, Some(Predicate::set([1]))).unwrap();
        assert_eq!(counts(&cf, &by_tag), vec![("x".into(), 1), ("y".into(), 1)]);
        cf.filter(tags, Some(Predicate::set(["x"]))).unwrap();
        assert_eq!(cf.passing_ids(n, true).unwrap(), ids(&[1]));
    }

    #[test]
    fn test_group_top_orders_by_value() {
        let mut cf = people();
        let city = cf.field_dimension("city").unwrap();
        let by_city = cf.group(city, |k| k.clone(), Count).unwrap();
        let top = cf.group_top(&by_city, 1).unwrap();
        assert_eq!(top[0].key, Key::text("A"));
        assert_eq!(top[0].value, 2);
    }

    #[test]
    fn test_group_disposal() {
        let mut cf = people();
        let city = cf.field_dimension("city").unwrap();
        let by_city = cf.group_by_key(city, Count).unwrap();
        assert_eq!(cf.group_value(&by_city, &Key::text("A")).unwrap(), Some(2));
        assert_eq!(cf.group_len(by_city.id()).unwrap(), 2);

        cf.dispose_group(by_city.id()).unwrap();
        assert!(cf.dispose_group(by_city.id()).unwrap_err().is_state());
        assert!(cf.group_value(&by_city, &Key::text("A")).unwrap_err().is_state());
        assert!(cf.is_live(city));
        cf.dispose_dimension(city).unwrap();
        assert!(!cf.is_live(city));
    }

    #[test]
    fn test_unknown_field_is_a_configuration_error() {
        let mut cf = people();
        assert!(cf.field_dimension("height").unwrap_err().is_configuration());
    }
}
