//! Incremental maintenance checked against from-scratch recomputation

use std::collections::{BTreeMap, BTreeSet};

use fp_core::{Count, Crossfilter, DimensionId, ExactSum, GroupHandle, Predicate, Reducer, Sum};
use fp_data::{Key, Record, RecordId};
use proptest::prelude::*;

const FIELDS: [&str; 3] = ["a", "b", "c"];

/// Three keyed fields plus a fractional amount
type Row = (i64, i64, i64, f64);

#[derive(Debug, Clone)]
enum Op {
    Range(usize, i64, i64),
    Set(usize, Vec<i64>),
    Clear(usize),
    Append(Vec<Row>),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..3, 0i64..10, 0i64..10).prop_map(|(d, lo, hi)| Op::Range(d, lo, hi)),
        (0usize..3, prop::collection::vec(0i64..10, 0..4)).prop_map(|(d, v)| Op::Set(d, v)),
        (0usize..3).prop_map(Op::Clear),
        prop::collection::vec(row_values(), 1..5).prop_map(Op::Append),
    ]
}

fn row_values() -> impl Strategy<Value = Row> {
    (0i64..10, 0i64..10, 0i64..10, -1e3f64..1e3)
}

fn row((a, b, c, v): Row) -> Record {
    Record::new().with("a", a).with("b", b).with("c", c).with("v", v)
}

struct Harness {
    cf: Crossfilter,
    dims: Vec<DimensionId>,
    counts: Vec<GroupHandle<Count>>,
    sums: Vec<GroupHandle<Sum>>,
    predicates: Vec<Option<Predicate>>,
}

impl Harness {
    fn new(rows: Vec<Row>) -> Self {
        let mut cf = Crossfilter::from_records(rows.into_iter().map(row).collect()).unwrap();
        let dims: Vec<_> = FIELDS.iter().map(|f| cf.field_dimension(f).unwrap()).collect();
        let counts = dims.iter().map(|d| cf.group_by_key(*d, Count).unwrap()).collect();
        let sums = dims
            .iter()
            .map(|d| cf.group(*d, |k| Key::number((k.as_f64().unwrap_or(0.0) / 3.0).floor()), Sum::new("v")).unwrap())
            .collect();
        Self {
            cf,
            dims,
            counts,
            sums,
            predicates: vec![None, None, None],
        }
    }

    fn apply(&mut self, op: Op) {
        match op {
            Op::Range(d, lo, hi) => self.set(d, Some(Predicate::range(lo, hi))),
            Op::Set(d, values) => self.set(d, Some(Predicate::set(values))),
            Op::Clear(d) => self.set(d, None),
            Op::Append(rows) => {
                self.cf.add(rows.into_iter().map(row).collect()).unwrap();
            }
        }
    }

    fn set(&mut self, d: usize, predicate: Option<Predicate>) {
        self.cf.filter(self.dims[d], predicate.clone()).unwrap();
        self.predicates[d] = predicate;
    }

    fn passes(&self, record: &Record, skip: Option<usize>) -> bool {
        FIELDS.iter().enumerate().all(|(i, field)| {
            Some(i) == skip
                || self.predicates[i]
                    .as_ref()
                    .map_or(true, |p| p.matches(&record.get(field).to_key()))
        })
    }

    fn oracle_ids(&self, skip: Option<usize>) -> BTreeSet<RecordId> {
        self.cf
            .store()
            .snapshot()
            .iter()
            .filter(|r| self.passes(r, skip))
            .map(|r| r.id())
            .collect()
    }

    fn check(&self) {
        for (d, field) in FIELDS.iter().enumerate() {
            let mut counts: BTreeMap<Key, u64> = BTreeMap::new();
            let mut sums: BTreeMap<Key, ExactSum> = BTreeMap::new();
            let sum = Sum::new("v");
            for record in self.cf.store().snapshot() {
                let key = record.get(field).to_key();
                let bucket = Key::number((key.as_f64().unwrap_or(0.0) / 3.0).floor());
                let count = counts.entry(key).or_insert(0);
                let total = sums.entry(bucket).or_insert_with(|| sum.initial());
                if self.passes(record, Some(d)) {
                    *count += 1;
                    sum.add(total, record);
                }
            }

            let got: BTreeMap<Key, u64> = self
                .cf
                .entries(&self.counts[d])
                .unwrap()
                .into_iter()
                .map(|e| (e.key, e.value))
                .collect();
            assert_eq!(got, counts, "count group on {field}");

            let got: BTreeMap<Key, f64> = self
                .cf
                .entries(&self.sums[d])
                .unwrap()
                .into_iter()
                .map(|e| (e.key, e.value.value()))
                .collect();
            let want: BTreeMap<Key, f64> = sums.into_iter().map(|(k, v)| (k, v.value())).collect();
            assert_eq!(got, want, "sum group on {field}");

            assert_eq!(self.cf.passing_ids(self.dims[d], true).unwrap(), self.oracle_ids(Some(d)));
        }
        assert_eq!(self.cf.all_passing_ids(), self.oracle_ids(None));
        assert_eq!(self.cf.passing_count(), self.oracle_ids(None).len());
    }
}

fn rows() -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(row_values(), 0..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_groups_match_full_recompute(rows in rows(), ops in prop::collection::vec(op(), 1..25)) {
        let mut harness = Harness::new(rows);
        for op in ops {
            harness.apply(op);
            harness.check();
        }
    }

    #[test]
    fn prop_self_view_ignores_own_predicate(
        rows in rows(),
        other in (0i64..10, 0i64..10),
        own_a in (0i64..10, 0i64..10),
        own_b in (0i64..10, 0i64..10),
    ) {
        let mut harness = Harness::new(rows);
        harness.set(1, Some(Predicate::range(other.0, other.1)));
        harness.set(0, Some(Predicate::range(own_a.0, own_a.1)));
        let first = harness.cf.passing_ids(harness.dims[0], true).unwrap();
        harness.set(0, Some(Predicate::range(own_b.0, own_b.1)));
        let second = harness.cf.passing_ids(harness.dims[0], true).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_clearing_twice_equals_clearing_once(rows in rows(), ops in prop::collection::vec(op(), 0..10)) {
        let mut harness = Harness::new(rows);
        for op in ops {
            harness.apply(op);
        }
        for d in 0..3 {
            harness.set(d, None);
        }
        let once = harness.cf.all_passing_ids();
        for d in 0..3 {
            harness.set(d, None);
        }
        prop_assert_eq!(&once, &harness.cf.all_passing_ids());
        prop_assert_eq!(once.len(), harness.cf.size());
    }

    #[test]
    fn prop_append_is_monotonic(rows in rows(), extra in prop::collection::vec(row_values(), 1..10)) {
        let mut harness = Harness::new(rows);
        harness.set(0, Some(Predicate::range(3, 7)));
        let before = harness.cf.passing_count();

        let inside: Vec<_> = extra.iter().map(|(_, b, c, v)| (5, *b, *c, *v)).collect();
        harness.apply(Op::Append(inside.clone()));
        prop_assert_eq!(harness.cf.passing_count(), before + inside.len());

        let outside: Vec<_> = extra.iter().map(|(_, b, c, v)| (9, *b, *c, *v)).collect();
        harness.apply(Op::Append(outside));
        prop_assert_eq!(harness.cf.passing_count(), before + inside.len());
    }
}
