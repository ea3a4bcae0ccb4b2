//! Widget adapters and the registry that builds them from descriptors

use std::collections::BTreeSet;

use fp_core::{Count, Crossfilter, DimensionId, FilterError, GroupHandle, Predicate, Result, Sum};
use fp_data::Key;

use crate::descriptor::{WidgetDescriptor, WidgetKind};
use crate::render::Row;
use crate::widget::{FilterSpec, Interaction, WidgetAdapter};

pub mod bar;
pub mod box_plot;
pub mod ring;
pub mod row;
pub mod scatter;
pub mod time_line;

pub use bar::BarChart;
pub use box_plot::BoxPlot;
pub use row::RowChart;
pub use scatter::ScatterPlot;
pub use time_line::TimeLineChart;

/// Label of the bucket collecting capped categories
pub const OTHERS: &str = "Others";

/// Build the adapter for a descriptor. The descriptor must carry an id.
pub fn build_adapter(descriptor: WidgetDescriptor, engine: &mut Crossfilter) -> Result<Box<dyn WidgetAdapter>> {
    validate(&descriptor, engine)?;
    let adapter: Box<dyn WidgetAdapter> = match &descriptor.kind {
        WidgetKind::BarChart(_) => Box::new(BarChart::build(descriptor, engine)?),
        WidgetKind::RowChart(_) => Box::new(RowChart::build(descriptor, engine)?),
        WidgetKind::RingChart(_) => Box::new(ring::build(descriptor, engine)?),
        WidgetKind::TimeLineChart(_) => Box::new(TimeLineChart::build(descriptor, engine)?),
        WidgetKind::ScatterPlot(_) => Box::new(ScatterPlot::build(descriptor, engine)?),
        WidgetKind::BoxPlot(_) => Box::new(BoxPlot::build(descriptor, engine)?),
    };
    tracing::debug!("Built {} adapter '{}'", adapter.descriptor().kind.name(), adapter.id());
    Ok(adapter)
}

/// Check param arity and that every field read is a known column
pub fn validate(descriptor: &WidgetDescriptor, engine: &Crossfilter) -> Result<()> {
    let arity = match descriptor.kind {
        WidgetKind::BarChart(_) => 1..=1,
        WidgetKind::RowChart(_) | WidgetKind::RingChart(_) | WidgetKind::TimeLineChart(_) => 1..=2,
        WidgetKind::ScatterPlot(_) => 2..=2,
        WidgetKind::BoxPlot(_) => 1..=usize::MAX,
    };
    if !arity.contains(&descriptor.param.len()) {
        return Err(FilterError::configuration(format!(
            "{} takes {}..={} params, got {}",
            descriptor.kind.name(),
            arity.start(),
            arity.end(),
            descriptor.param.len()
        )));
    }
    for field in descriptor.fields() {
        engine.store().require_field(field)?;
    }
    Ok(())
}

/// Count or sum of a value field, per bucket
pub(crate) enum Measure {
    Count(GroupHandle<Count>),
    Sum(GroupHandle<Sum>),
}

impl Measure {
    pub fn build<F>(engine: &mut Crossfilter, dimension: DimensionId, key_fn: F, value_field: Option<&str>) -> Result<Self>
    where
        F: Fn(&Key) -> Key + Send + Sync + 'static,
    {
        Ok(match value_field {
            Some(field) => Measure::Sum(engine.group(dimension, key_fn, Sum::new(field))?),
            None => Measure::Count(engine.group(dimension, key_fn, Count)?),
        })
    }

    pub fn values(&self, engine: &Crossfilter) -> Result<Vec<(Key, f64)>> {
        Ok(match self {
            Measure::Count(handle) => engine
                .entries(handle)?
                .into_iter()
                .map(|e| (e.key, e.value as f64))
                .collect(),
            Measure::Sum(handle) => engine
                .entries(handle)?
                .into_iter()
                .map(|e| (e.key, e.value.value()))
                .collect(),
        })
    }
}

/// Selected categories of a click-to-toggle chart
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Selection(BTreeSet<Key>);

impl Selection {
    /// The selection after an interaction, without committing it
    pub fn after(&self, interaction: Interaction) -> Result<Selection> {
        let mut next = self.clone();
        match interaction {
            Interaction::Toggle(key) => {
                if !next.0.remove(&key) {
                    next.0.insert(key);
                }
            }
            Interaction::Select(keys) => next.0 = keys.into_iter().collect(),
            Interaction::Clear => next.0.clear(),
            other => {
                return Err(FilterError::configuration(format!(
                    "a category chart cannot be filtered with {other:?}"
                )))
            }
        }
        Ok(next)
    }

    pub fn predicate(&self) -> Option<Predicate> {
        (!self.0.is_empty()).then(|| Predicate::Set(self.0.clone()))
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.0.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply an interaction to a dimension and keep the result
    pub fn commit(&mut self, engine: &mut Crossfilter, dimension: DimensionId, interaction: Interaction) -> Result<bool> {
        let next = self.after(interaction)?;
        let changed = engine.filter(dimension, next.predicate())?;
        *self = next;
        Ok(changed)
    }

    /// Replay the first `=` spec on `field`
    pub fn replay(&mut self, engine: &mut Crossfilter, dimension: DimensionId, field: &str, specs: &[FilterSpec]) -> Result<bool> {
        match specs.iter().find(|s| s.field == field) {
            Some(spec) => self.commit(engine, dimension, Interaction::Select(spec.values())),
            None => Ok(false),
        }
    }
}

/// Predicate of a one-dimensional range gesture
pub(crate) fn range_predicate(interaction: Interaction) -> Result<Option<Predicate>> {
    match interaction {
        Interaction::Brush { min, max } => Ok(Some(Predicate::range(min, max))),
        Interaction::Clear => Ok(None),
        other => Err(FilterError::configuration(format!(
            "a range chart cannot be filtered with {other:?}"
        ))),
    }
}

/// Export the range predicate of a dimension
pub(crate) fn range_filters(engine: &Crossfilter, dimension: DimensionId, field: &str) -> Vec<FilterSpec> {
    match engine.predicate(dimension) {
        Ok(Some(Predicate::Range { min, max, .. })) => vec![FilterSpec::between(field, min, max)],
        _ => Vec::new(),
    }
}

/// Replay the first `between` spec on `field` as a brush
pub(crate) fn replay_range(engine: &mut Crossfilter, dimension: DimensionId, field: &str, specs: &[FilterSpec]) -> Result<bool> {
    match specs.iter().filter(|s| s.field == field).find_map(FilterSpec::bounds) {
        Some((min, max)) => engine.filter(dimension, Some(Predicate::range(min, max))),
        None => Ok(false),
    }
}

/// Largest `cap` categories by value, the rest summed under [`OTHERS`]
pub(crate) fn capped_rows(mut values: Vec<(Key, f64)>, cap: usize, selection: &Selection) -> Vec<Row> {
    values.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let rest: f64 = values.iter().skip(cap).map(|(_, v)| v).sum();
    let has_rest = values.len() > cap;
    let mut rows: Vec<Row> = values
        .into_iter()
        .take(cap)
        .map(|(key, value)| Row {
            selected: selection.contains(&key),
            label: key.to_string(),
            value,
        })
        .collect();
    if has_rest {
        rows.push(Row {
            label: OTHERS.to_string(),
            value: rest,
            selected: false,
        });
    }
    rows
}

/// Category label for a value, with a chart-specific label for missing data
pub(crate) fn category_key(value: &fp_data::Value, missing: &str) -> Key {
    if value.is_missing() {
        Key::text(missing)
    } else {
        Key::text(value.to_string())
    }
}
