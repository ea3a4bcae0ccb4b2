//! Dimension predicates

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use fp_data::Key;

/// A custom predicate over dimension keys. Two custom predicates are
/// equivalent only when they share the same function.
#[derive(Clone)]
pub struct CustomPredicate(Arc<dyn Fn(&Key) -> bool + Send + Sync>);

impl CustomPredicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Key) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn test(&self, key: &Key) -> bool {
        (self.0)(key)
    }
}

impl PartialEq for CustomPredicate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomPredicate(..)")
    }
}

/// The active filter of a dimension
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `[min, max)`, or `[min, max]` when `inclusive`
    Range { min: Key, max: Key, inclusive: bool },
    /// Key equals one of the values
    Set(BTreeSet<Key>),
    Custom(CustomPredicate),
}

impl Predicate {
    /// Closed-open range `[min, max)`
    pub fn range(min: impl Into<Key>, max: impl Into<Key>) -> Self {
        Predicate::Range {
            min: min.into(),
            max: max.into(),
            inclusive: false,
        }
    }

    /// Closed range `[min, max]`
    pub fn range_inclusive(min: impl Into<Key>, max: impl Into<Key>) -> Self {
        Predicate::Range {
            min: min.into(),
            max: max.into(),
            inclusive: true,
        }
    }

    pub fn set<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Predicate::Set(values.into_iter().map(Into::into).collect())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Key) -> bool + Send + Sync + 'static,
    {
        Predicate::Custom(CustomPredicate::new(f))
    }

    pub fn matches(&self, key: &Key) -> bool {
        match self {
            Predicate::Range { min, max, inclusive } => {
                key >= min && (key < max || (*inclusive && key == max))
            }
            Predicate::Set(values) => values.contains(key),
            Predicate::Custom(f) => f.test(key),
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Predicate::Range { .. })
    }

    /// Positions `[lo, hi)` of the entries of a key-sorted slice that satisfy
    /// a range predicate
    pub(crate) fn range_bounds<T>(&self, sorted: &[(Key, T)]) -> Option<(usize, usize)> {
        match self {
            Predicate::Range { min, max, inclusive } => {
                let lo = sorted.partition_point(|(k, _)| k < min);
                let hi = if *inclusive {
                    sorted.partition_point(|(k, _)| k <= max)
                } else {
                    sorted.partition_point(|(k, _)| k < max)
                };
                Some((lo, hi.max(lo)))
            }
            _ => None,
        }
    }
}

/// Whether `key` passes an optional predicate; no predicate passes everything
pub fn passes(predicate: Option<&Predicate>, key: &Key) -> bool {
    predicate.map_or(true, |p| p.matches(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_is_closed_open_by_default() {
        let p = Predicate::range(25, 60);
        assert!(p.matches(&Key::from(25)));
        assert!(p.matches(&Key::from(59.9)));
        assert!(!p.matches(&Key::from(60)));
        assert!(Predicate::range_inclusive(25, 60).matches(&Key::from(60)));
        assert!(!p.matches(&Key::Missing));
    }

    #[test]
    fn test_range_bounds_on_sorted_entries() {
        let sorted: Vec<(Key, u32)> = [10, 20, 20, 30, 40].iter().enumerate().map(|(i, v)| (Key::from(*v), i as u32)).collect();
        assert_eq!(Predicate::range(20, 40).range_bounds(&sorted), Some((1, 4)));
        assert_eq!(Predicate::range_inclusive(20, 40).range_bounds(&sorted), Some((1, 5)));
        assert_eq!(Predicate::range(40, 10).range_bounds(&sorted), Some((4, 4)));
    }

    #[test]
    fn test_custom_equivalence_is_identity() {
        let a = Predicate::custom(|k| k.is_missing());
        let b = a.clone();
        let c = Predicate::custom(|k| k.is_missing());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(Predicate::set(["x", "y"]), Predicate::set(["y", "x"]));
    }
}
