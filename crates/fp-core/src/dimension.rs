//! Dimension indexes
//!
//! A dimension keeps every key its accessor produced, sorted, together with a
//! per-record count of keys passing the active predicate. Range-to-range
//! predicate changes only touch the index entries between the old and the new
//! bounds.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use fp_data::{Key, Record};

use crate::group::GroupId;
use crate::predicate::{passes, Predicate};

/// Handle of a dimension inside a [`crate::Crossfilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimensionId(pub(crate) u32);

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dimension#{}", self.0)
    }
}

/// Maps a record to its key(s)
#[derive(Clone)]
pub(crate) enum KeyFn {
    Single(Arc<dyn Fn(&Record) -> Key + Send + Sync>),
    /// Split policy: one record, many keys
    Many(Arc<dyn Fn(&Record) -> Vec<Key> + Send + Sync>),
}

enum RecordKeys {
    Single(Vec<Key>),
    Many(Vec<Vec<Key>>),
}

pub(crate) struct DimensionState {
    pub slot: usize,
    key_fn: KeyFn,
    keys: RecordKeys,
    /// (key, record position), sorted by key then position
    index: Vec<(Key, u32)>,
    /// Number of the record's keys passing the predicate
    matches: Vec<u32>,
    predicate: Option<Predicate>,
    pub groups: Vec<GroupId>,
    missing: usize,
}

impl DimensionState {
    pub fn new(slot: usize, key_fn: KeyFn, records: &[Record]) -> Self {
        let keys = match key_fn {
            KeyFn::Single(_) => RecordKeys::Single(Vec::with_capacity(records.len())),
            KeyFn::Many(_) => RecordKeys::Many(Vec::with_capacity(records.len())),
        };
        let mut state = Self {
            slot,
            key_fn,
            keys,
            index: Vec::with_capacity(records.len()),
            matches: Vec::with_capacity(records.len()),
            predicate: None,
            groups: Vec::new(),
            missing: 0,
        };
        state.append(records);
        state
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn keys_of(&self, position: usize) -> &[Key] {
        match &self.keys {
            RecordKeys::Single(keys) => std::slice::from_ref(&keys[position]),
            RecordKeys::Many(keys) => &keys[position],
        }
    }

    pub fn index(&self) -> &[(Key, u32)] {
        &self.index
    }

    /// Records whose key was missing or non-finite
    pub fn missing_count(&self) -> usize {
        self.missing
    }

    /// Index records appended to the store.
    ///
    /// Returns, for each new record in order, whether it passes the current
    /// predicate. New entries are merged into the sorted index.
    pub fn append(&mut self, records: &[Record]) -> Vec<bool> {
        let base = self.matches.len();
        let mut fresh: Vec<(Key, u32)> = Vec::with_capacity(records.len());
        let mut passing = Vec::with_capacity(records.len());

        for (i, record) in records.iter().enumerate() {
            let position = (base + i) as u32;
            let keys = match &self.key_fn {
                KeyFn::Single(f) => vec![f(record)],
                KeyFn::Many(f) => {
                    let mut keys = f(record);
                    keys.sort();
                    keys.dedup();
                    if keys.is_empty() {
                        keys.push(Key::Missing);
                    }
                    keys
                }
            };

            if keys.iter().any(Key::is_missing) {
                self.missing += 1;
                tracing::trace!("Record {} has a missing key, using the sentinel", record.id());
            }

            let count = keys.iter().filter(|k| passes(self.predicate.as_ref(), k)).count() as u32;
            self.matches.push(count);
            passing.push(count > 0);
            fresh.extend(keys.iter().cloned().map(|k| (k, position)));

            match &mut self.keys {
                RecordKeys::Single(all) => all.extend(keys),
                RecordKeys::Many(all) => all.push(keys),
            }
        }

        fresh.sort();
        self.index = merge_sorted(std::mem::take(&mut self.index), fresh);
        passing
    }

    /// Replace the predicate.
    ///
    /// Returns the records whose pass state for this dimension flipped, with
    /// their new state, in position order.
    pub fn refilter(&mut self, new: Option<Predicate>) -> Vec<(usize, bool)> {
        let old = self.predicate.take();
        let mut before: AHashMap<usize, bool> = AHashMap::new();

        let range_only = old.as_ref().map_or(true, Predicate::is_range)
            && new.as_ref().map_or(true, Predicate::is_range);

        if range_only {
            let all = (0, self.index.len());
            let old_bounds = old.as_ref().and_then(|p| p.range_bounds(&self.index)).unwrap_or(all);
            let new_bounds = new.as_ref().and_then(|p| p.range_bounds(&self.index)).unwrap_or(all);
            for entry in difference(new_bounds, old_bounds) {
                self.bump(entry, true, &mut before);
            }
            for entry in difference(old_bounds, new_bounds) {
                self.bump(entry, false, &mut before);
            }
        } else {
            for entry in 0..self.index.len() {
                let change = {
                    let key = &self.index[entry].0;
                    let was = passes(old.as_ref(), key);
                    let is = passes(new.as_ref(), key);
                    (was != is).then_some(is)
                };
                if let Some(entering) = change {
                    self.bump(entry, entering, &mut before);
                }
            }
        }

        self.predicate = new;

        let mut flips: Vec<(usize, bool)> = before
            .into_iter()
            .filter_map(|(position, was)| {
                let now = self.matches[position] > 0;
                (now != was).then_some((position, now))
            })
            .collect();
        flips.sort_unstable();
        flips
    }

    fn bump(&mut self, entry: usize, entering: bool, before: &mut AHashMap<usize, bool>) {
        let position = self.index[entry].1 as usize;
        let count = &mut self.matches[position];
        before.entry(position).or_insert(*count > 0);
        if entering {
            *count += 1;
        } else {
            *count = count.saturating_sub(1);
        }
    }
}

/// Positions in `a` that are not in `b`, for half-open ranges
fn difference(a: (usize, usize), b: (usize, usize)) -> impl Iterator<Item = usize> {
    (a.0..a.1.min(b.0)).chain(a.0.max(b.1)..a.1)
}

fn merge_sorted(existing: Vec<(Key, u32)>, fresh: Vec<(Key, u32)>) -> Vec<(Key, u32)> {
    if existing.is_empty() {
        return fresh;
    }
    if fresh.is_empty() {
        return existing;
    }
    let mut merged = Vec::with_capacity(existing.len() + fresh.len());
    let mut left = existing.into_iter().peekable();
    let mut right = fresh.into_iter().peekable();
    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l <= r,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_left { left.next() } else { right.next() };
        merged.extend(next);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ages(values: &[f64]) -> Vec<Record> {
        values.iter().map(|v| Record::new().with("age", *v)).collect()
    }

    fn age_dimension(records: &[Record]) -> DimensionState {
        DimensionState::new(0, KeyFn::Single(Arc::new(|r: &Record| r.get("age").to_key())), records)
    }

    #[test]
    fn test_range_change_reports_only_flips() {
        let mut dim = age_dimension(&ages(&[20.0, 35.0, 50.0, 65.0]));
        let flips = dim.refilter(Some(Predicate::range(25, 60)));
        assert_eq!(flips, vec![(0, false), (3, false)]);
        let flips = dim.refilter(Some(Predicate::range(30, 70)));
        assert_eq!(flips, vec![(3, true)]);
        let flips = dim.refilter(None);
        assert_eq!(flips, vec![(0, true)]);
    }

    #[test]
    fn test_append_merges_index_and_applies_predicate() {
        let mut dim = age_dimension(&ages(&[50.0, 20.0]));
        dim.refilter(Some(Predicate::range(0, 30)));
        let passing = dim.append(&ages(&[10.0, 40.0, f64::NAN]));
        assert_eq!(passing, vec![true, false, false]);
        let keys: Vec<_> = dim.index().iter().map(|(_, p)| *p).collect();
        assert_eq!(keys, vec![4, 2, 1, 3, 0]);
        assert_eq!(dim.missing_count(), 1);
    }

    #[test]
    fn test_split_record_passes_when_any_key_passes() {
        let records = vec![
            Record::new().with("tags", "a;b"),
            Record::new().with("tags", "b"),
            Record::new(),
        ];
        let split = KeyFn::Many(Arc::new(|r: &Record| {
            r.get("tags").as_str().map(|s| s.split(';').map(Key::text).collect()).unwrap_or_default()
        }));
        let mut dim = DimensionState::new(0, split, &records);
        assert_eq!(dim.keys_of(0).len(), 2);
        assert_eq!(dim.keys_of(2), &[Key::Missing]);

        let flips = dim.refilter(Some(Predicate::set(["a"])));
        assert_eq!(flips, vec![(1, false), (2, false)]);
        let flips = dim.refilter(Some(Predicate::set(["b"])));
        assert_eq!(flips, vec![(1, true)]);
    }

    #[test]
    fn test_difference_of_ranges() {
        assert_eq!(difference((0, 10), (3, 5)).collect::<Vec<_>>(), vec![0, 1, 2, 5, 6, 7, 8, 9]);
        assert_eq!(difference((3, 5), (0, 10)).count(), 0);
        assert_eq!(difference((5, 8), (0, 3)).collect::<Vec<_>>(), vec![5, 6, 7]);
    }
}
