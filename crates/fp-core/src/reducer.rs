//! Reducers: the add/remove/initial triples that maintain group values

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::marker::PhantomData;

use ahash::AHashSet;
use fp_data::Record;
use serde::{Serialize, Serializer};

/// Incremental aggregation over records.
///
/// `remove` must exactly undo `add` for the same record, so that
/// `remove(add(s, r), r) == s` for every state `s`.
pub trait Reducer: Send + Sync + 'static {
    type Value: Clone + Debug + PartialEq + Send + Sync + 'static;

    fn initial(&self) -> Self::Value;
    fn add(&self, value: &mut Self::Value, record: &Record);
    fn remove(&self, value: &mut Self::Value, record: &Record);
}

/// Number of records
#[derive(Debug, Clone, Copy, Default)]
pub struct Count;

impl Reducer for Count {
    type Value = u64;

    fn initial(&self) -> u64 {
        0
    }

    fn add(&self, value: &mut u64, _record: &Record) {
        *value += 1;
    }

    fn remove(&self, value: &mut u64, _record: &Record) {
        *value = value.saturating_sub(1);
    }
}

/// Exact running sum of floats.
///
/// Holds the sum as non-overlapping partials (a Shewchuk expansion), so every
/// addition is exact and [`ExactSum::remove`] undoes [`ExactSum::add`] bit for
/// bit. Non-finite addends are counted apart from the partials. Two sums are
/// equal when their correctly rounded values are.
#[derive(Debug, Clone, Default)]
pub struct ExactSum {
    /// Increasing magnitude, pairwise non-overlapping
    partials: Vec<f64>,
    pos_inf: u64,
    neg_inf: u64,
    nan: u64,
}

impl ExactSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, x: f64) {
        if x.is_nan() {
            self.nan += 1;
        } else if x == f64::INFINITY {
            self.pos_inf += 1;
        } else if x == f64::NEG_INFINITY {
            self.neg_inf += 1;
        } else {
            self.grow(x);
        }
    }

    pub fn remove(&mut self, x: f64) {
        if x.is_nan() {
            self.nan = self.nan.saturating_sub(1);
        } else if x == f64::INFINITY {
            self.pos_inf = self.pos_inf.saturating_sub(1);
        } else if x == f64::NEG_INFINITY {
            self.neg_inf = self.neg_inf.saturating_sub(1);
        } else {
            self.grow(-x);
        }
    }

    /// Fold another sum into this one
    pub fn merge(&mut self, other: &ExactSum) {
        for x in &other.partials {
            self.grow(*x);
        }
        self.pos_inf += other.pos_inf;
        self.neg_inf += other.neg_inf;
        self.nan += other.nan;
    }

    fn grow(&mut self, mut x: f64) {
        let mut kept = 0;
        for j in 0..self.partials.len() {
            let mut y = self.partials[j];
            if x.abs() < y.abs() {
                std::mem::swap(&mut x, &mut y);
            }
            let hi = x + y;
            let lo = y - (hi - x);
            if lo != 0.0 {
                self.partials[kept] = lo;
                kept += 1;
            }
            x = hi;
        }
        self.partials.truncate(kept);
        self.partials.push(x);
    }

    /// The sum rounded once, to nearest with ties to even
    pub fn value(&self) -> f64 {
        if self.nan > 0 || (self.pos_inf > 0 && self.neg_inf > 0) {
            return f64::NAN;
        }
        if self.pos_inf > 0 {
            return f64::INFINITY;
        }
        if self.neg_inf > 0 {
            return f64::NEG_INFINITY;
        }

        let partials = &self.partials;
        let Some((&top, rest)) = partials.split_last() else {
            return 0.0;
        };
        let mut hi = top;
        let mut lo = 0.0;
        let mut n = rest.len();
        while n > 0 {
            n -= 1;
            let x = hi;
            let y = partials[n];
            hi = x + y;
            lo = y - (hi - x);
            if lo != 0.0 {
                break;
            }
        }
        // the remaining partials decide a tie between hi and its neighbour
        if n > 0 && ((lo < 0.0 && partials[n - 1] < 0.0) || (lo > 0.0 && partials[n - 1] > 0.0)) {
            let y = lo * 2.0;
            let x = hi + y;
            if y == x - hi {
                hi = x;
            }
        }
        hi
    }
}

impl PartialEq for ExactSum {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.value(), other.value());
        a == b || (a.is_nan() && b.is_nan())
    }
}

impl PartialOrd for ExactSum {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.value().partial_cmp(&other.value())
    }
}

impl Serialize for ExactSum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value())
    }
}

/// Sum of a numeric field; missing values count as zero
#[derive(Debug, Clone)]
pub struct Sum {
    field: String,
}

impl Sum {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }

    fn addend(&self, record: &Record) -> f64 {
        record.get(&self.field).as_f64().unwrap_or(0.0)
    }
}

impl Reducer for Sum {
    type Value = ExactSum;

    fn initial(&self) -> ExactSum {
        ExactSum::new()
    }

    fn add(&self, value: &mut ExactSum, record: &Record) {
        value.add(self.addend(record));
    }

    fn remove(&self, value: &mut ExactSum, record: &Record) {
        value.remove(self.addend(record));
    }
}

/// Accumulator of one stack layer
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StackCell {
    pub count: u64,
    pub total: ExactSum,
}

/// Per-category totals of a stacked bucket
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Stack(BTreeMap<String, StackCell>);

impl Stack {
    /// Total of one category, zero when absent
    pub fn get(&self, category: &str) -> f64 {
        self.0.get(category).map_or(0.0, |c| c.total.value())
    }

    pub fn cells(&self) -> impl Iterator<Item = (&str, &StackCell)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn total(&self) -> f64 {
        let mut total = ExactSum::new();
        for cell in self.0.values() {
            total.merge(&cell.total);
        }
        total.value()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Splits each bucket by the category of `field`.
///
/// Categories outside the recognised set (and missing values) are collected
/// under [`Stacked::OTHER`]. Each record contributes the value of `weight`,
/// or one when no weight field is set.
#[derive(Debug, Clone)]
pub struct Stacked {
    field: String,
    categories: AHashSet<String>,
    weight: Option<String>,
}

impl Stacked {
    pub const OTHER: &'static str = "Other";

    pub fn new<I, S>(field: impl Into<String>, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            categories: categories.into_iter().map(Into::into).collect(),
            weight: None,
        }
    }

    pub fn weighted_by(mut self, field: impl Into<String>) -> Self {
        self.weight = Some(field.into());
        self
    }

    fn category(&self, record: &Record) -> String {
        let value = record.get(&self.field);
        if value.is_missing() {
            return Self::OTHER.to_string();
        }
        let label = value.to_string();
        if self.categories.contains(&label) {
            label
        } else {
            Self::OTHER.to_string()
        }
    }

    fn increment(&self, record: &Record) -> f64 {
        match &self.weight {
            Some(field) => record.get(field).as_f64().unwrap_or(0.0),
            None => 1.0,
        }
    }
}

impl Reducer for Stacked {
    type Value = Stack;

    fn initial(&self) -> Stack {
        Stack::default()
    }

    fn add(&self, value: &mut Stack, record: &Record) {
        let cell = value.0.entry(self.category(record)).or_default();
        cell.count += 1;
        cell.total.add(self.increment(record));
    }

    fn remove(&self, value: &mut Stack, record: &Record) {
        let category = self.category(record);
        if let Some(cell) = value.0.get_mut(&category) {
            cell.count = cell.count.saturating_sub(1);
            cell.total.remove(self.increment(record));
            if cell.count == 0 {
                value.0.remove(&category);
            }
        }
    }
}

/// Keeps the sorted values of a numeric field, for box plots
#[derive(Debug, Clone)]
pub struct SortedValues {
    field: String,
}

impl SortedValues {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl Reducer for SortedValues {
    type Value = Vec<f64>;

    fn initial(&self) -> Vec<f64> {
        Vec::new()
    }

    fn add(&self, value: &mut Vec<f64>, record: &Record) {
        if let Some(v) = record.get(&self.field).as_f64() {
            let at = value.partition_point(|x| *x < v);
            value.insert(at, v);
        }
    }

    fn remove(&self, value: &mut Vec<f64>, record: &Record) {
        if let Some(v) = record.get(&self.field).as_f64() {
            let at = value.partition_point(|x| *x < v);
            if value.get(at) == Some(&v) {
                value.remove(at);
            }
        }
    }
}

/// Reducer built from three closures
pub struct FnReducer<V, I, A, R> {
    initial: I,
    add: A,
    remove: R,
    _value: PhantomData<fn() -> V>,
}

/// Build a reducer from `initial`, `add` and `remove` closures
pub fn reducer_fn<V, I, A, R>(initial: I, add: A, remove: R) -> FnReducer<V, I, A, R>
where
    V: Clone + Debug + PartialEq + Send + Sync + 'static,
    I: Fn() -> V + Send + Sync + 'static,
    A: Fn(&mut V, &Record) + Send + Sync + 'static,
    R: Fn(&mut V, &Record) + Send + Sync + 'static,
{
    FnReducer {
        initial,
        add,
        remove,
        _value: PhantomData,
    }
}

impl<V, I, A, R> Reducer for FnReducer<V, I, A, R>
where
    V: Clone + Debug + PartialEq + Send + Sync + 'static,
    I: Fn() -> V + Send + Sync + 'static,
    A: Fn(&mut V, &Record) + Send + Sync + 'static,
    R: Fn(&mut V, &Record) + Send + Sync + 'static,
{
    type Value = V;

    fn initial(&self) -> V {
        (self.initial)()
    }

    fn add(&self, value: &mut V, record: &Record) {
        (self.add)(value, record)
    }

    fn remove(&self, value: &mut V, record: &Record) {
        (self.remove)(value, record)
    }
}
