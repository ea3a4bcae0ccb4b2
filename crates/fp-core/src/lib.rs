//! Incremental filtering and aggregation engine
//!
//! A [`Crossfilter`] owns a record store and any number of dimensions over
//! it. Each dimension carries at most one predicate; groups built on a
//! dimension aggregate the records passing every predicate except that
//! dimension's own, and are kept up to date as predicates change.

pub mod dimension;
pub mod engine;
pub mod error;
pub mod events;
pub mod group;
mod mask;
pub mod predicate;
pub mod reducer;

pub use dimension::DimensionId;
pub use engine::Crossfilter;
pub use error::{FilterError, Result};
pub use events::{listener_from_fn, FilterListener, FilteredResult, ListenerId, ListenerRegistry};
pub use group::{GroupEntry, GroupHandle, GroupId, ALL_KEY};
pub use predicate::{CustomPredicate, Predicate};
pub use reducer::{reducer_fn, Count, ExactSum, FnReducer, Reducer, SortedValues, Stack, StackCell, Stacked, Sum};
