//! Widget adapter abstraction - the seam between the panel and each chart kind

use std::collections::BTreeSet;
use std::sync::Arc;

use fp_core::{Crossfilter, DimensionId, Result};
use fp_data::{Key, RecordId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::descriptor::WidgetDescriptor;
use crate::render::RenderModel;

/// What a widget shows, published for an external renderer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    /// Records the widget draws; `None` means every record
    pub visible: Option<BTreeSet<RecordId>>,
    /// Whether the last view applied the widget's own predicate
    pub own_view: bool,
    /// Incremented on every view change
    pub revision: u64,
}

impl ViewState {
    pub fn is_visible(&self, id: RecordId) -> bool {
        self.visible.as_ref().map_or(true, |ids| ids.contains(&id))
    }
}

pub type SharedView = Arc<RwLock<ViewState>>;

/// A user gesture, already expressed in data coordinates
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    /// Drag a range over a one-dimensional axis: `[min, max)`
    Brush { min: Key, max: Key },
    /// Drag a rectangle over a scatter plot, in the widget's axis space
    Region { x: (f64, f64), y: (f64, f64) },
    /// Click a category
    Toggle(Key),
    /// Replace the selected categories
    Select(Vec<Key>),
    Clear,
}

/// Comparison of an exported filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "=")]
    Equals,
}

/// One exported widget filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub field: String,
    pub operand: Operand,
    pub value: serde_json::Value,
}

impl FilterSpec {
    pub fn between(field: impl Into<String>, min: &Key, max: &Key) -> Self {
        Self {
            field: field.into(),
            operand: Operand::Between,
            value: serde_json::Value::Array(vec![min.to_json(), max.to_json()]),
        }
    }

    pub fn equals<'a>(field: impl Into<String>, values: impl IntoIterator<Item = &'a Key>) -> Self {
        Self {
            field: field.into(),
            operand: Operand::Equals,
            value: serde_json::Value::Array(values.into_iter().map(Key::to_json).collect()),
        }
    }

    /// Bounds of a `between` filter
    pub fn bounds(&self) -> Option<(Key, Key)> {
        match (&self.operand, &self.value) {
            (Operand::Between, serde_json::Value::Array(pair)) if pair.len() == 2 => {
                Some((Key::from_json(&pair[0]), Key::from_json(&pair[1])))
            }
            _ => None,
        }
    }

    /// Values of an `=` filter; a scalar value counts as one
    pub fn values(&self) -> Vec<Key> {
        match &self.value {
            serde_json::Value::Array(values) => values.iter().map(Key::from_json).collect(),
            other => vec![Key::from_json(other)],
        }
    }
}

/// Follow-up an adapter asks for while a view is being applied
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Reaction {
    #[default]
    None,
    /// Commit this interaction; the broadcast it would cause is suppressed
    Refilter(Interaction),
}

/// Base trait for every widget adapter
pub trait WidgetAdapter: Send + Sync {
    /// Current descriptor, with the id and any derived defaults filled in
    fn descriptor(&self) -> &WidgetDescriptor;

    /// Dimensions owned by the widget
    fn dimensions(&self) -> Vec<DimensionId>;

    /// Whether the widget can hold a predicate at all
    fn can_filter(&self) -> bool {
        true
    }

    /// Translate a gesture into a predicate change on the widget's own
    /// dimensions. Returns whether any predicate changed.
    fn interact(&mut self, engine: &mut Crossfilter, interaction: Interaction) -> Result<bool>;

    /// Active predicate, exported as filter specs
    fn active_filters(&self, engine: &Crossfilter) -> Vec<FilterSpec>;

    /// Re-apply exported filter specs that name this widget's fields
    fn replay(&mut self, engine: &mut Crossfilter, specs: &[FilterSpec]) -> Result<bool>;

    /// Build the render model from the widget's groups
    fn render(&self, engine: &Crossfilter) -> Result<RenderModel>;

    fn view(&self) -> SharedView;

    /// The records passing every predicate, this widget's own included
    fn apply_own_view(&mut self, ids: &BTreeSet<RecordId>) -> Reaction {
        publish(&self.view(), ids, true);
        Reaction::None
    }

    /// The records passing every predicate except this widget's own
    fn apply_hidden_view(&mut self, ids: &BTreeSet<RecordId>) -> Reaction {
        publish(&self.view(), ids, false);
        Reaction::None
    }

    /// Release the widget's dimensions and groups
    fn dispose(&mut self, engine: &mut Crossfilter) -> Result<()> {
        for dimension in self.dimensions() {
            engine.dispose_dimension(dimension)?;
        }
        Ok(())
    }

    fn id(&self) -> &str {
        self.descriptor().id.as_deref().unwrap_or_default()
    }

    fn has_filter(&self, engine: &Crossfilter) -> bool {
        self.dimensions()
            .iter()
            .any(|d| matches!(engine.predicate(*d), Ok(Some(_))))
    }
}

fn publish(view: &SharedView, ids: &BTreeSet<RecordId>, own_view: bool) {
    let mut state = view.write();
    state.visible = Some(ids.clone());
    state.own_view = own_view;
    state.revision += 1;
}

pub fn new_view() -> SharedView {
    Arc::new(RwLock::new(ViewState::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_spec_json_shape() {
        let spec = FilterSpec::between("age", &Key::from(25), &Key::from(60));
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"field": "age", "operand": "between", "value": [25.0, 60.0]})
        );
        assert_eq!(spec.bounds(), Some((Key::from(25), Key::from(60))));

        let spec: FilterSpec = serde_json::from_value(json!({"field": "city", "operand": "=", "value": "A"})).unwrap();
        assert_eq!(spec.operand, Operand::Equals);
        assert_eq!(spec.values(), vec![Key::text("A")]);
    }

    #[test]
    fn test_view_state_visibility() {
        let view = new_view();
        assert!(view.read().is_visible(RecordId(9)));
        publish(&view, &[RecordId(1)].into_iter().collect(), false);
        let state = view.read();
        assert!(state.is_visible(RecordId(1)));
        assert!(!state.is_visible(RecordId(9)));
        assert_eq!(state.revision, 1);
    }
}
