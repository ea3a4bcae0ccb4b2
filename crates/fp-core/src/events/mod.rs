//! Filter-change listeners

use std::collections::BTreeSet;
use std::fmt;

use fp_data::RecordId;
use indexmap::IndexMap;
use serde::Serialize;

/// The live record set after a filter change
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FilteredResult {
    pub ids: BTreeSet<RecordId>,
    pub count: usize,
    /// Widget whose own predicate was left out, if any
    pub origin: Option<String>,
}

impl FilteredResult {
    pub fn new(ids: BTreeSet<RecordId>, origin: Option<String>) -> Self {
        Self {
            count: ids.len(),
            ids,
            origin,
        }
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.ids.contains(&id)
    }
}

/// Handle returned by [`ListenerRegistry::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Receives every broadcast filter result
pub trait FilterListener: Send + Sync {
    fn on_filtered(&mut self, result: &FilteredResult);
}

struct ClosureListener<F>(F);

impl<F> FilterListener for ClosureListener<F>
where
    F: FnMut(&FilteredResult) + Send + Sync,
{
    fn on_filtered(&mut self, result: &FilteredResult) {
        (self.0)(result)
    }
}

/// Create a listener from a closure
pub fn listener_from_fn<F>(f: F) -> Box<dyn FilterListener>
where
    F: FnMut(&FilteredResult) + Send + Sync + 'static,
{
    Box::new(ClosureListener(f))
}

/// Listeners in registration order
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: IndexMap<ListenerId, Box<dyn FilterListener>>,
    next_id: u64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Box<dyn FilterListener>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.insert(id, listener);
        id
    }

    /// Returns `false` when the id was not registered
    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.listeners.shift_remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn publish(&mut self, result: &FilteredResult) {
        for listener in self.listeners.values_mut() {
            listener.on_filtered(result);
        }
    }
}
