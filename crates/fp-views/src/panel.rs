//! Filter panel - coordinates widgets, custom filters and listeners
//!
//! The panel owns the [`Crossfilter`] engine and every widget adapter built
//! on it. After any predicate change it recomputes the live set and pushes
//! views out: the originating widget sees every predicate including its own,
//! every other widget sees every predicate except its own, and listeners get
//! the live set without the originator's predicate.

use std::collections::BTreeSet;
use std::ops::Range;
use std::time::Instant;

use ahash::AHashMap;
use fp_core::{
    listener_from_fn, Crossfilter, DimensionId, FilterError, FilteredResult, ListenerId, ListenerRegistry,
    Predicate, Result,
};
use fp_data::{Column, Record, RecordId};
use indexmap::IndexMap;
use uuid::Uuid;

use crate::debounce::Debouncer;
use crate::descriptor::{ColorBy, WidgetDescriptor, WidgetKind};
use crate::plots::{build_adapter, validate};
use crate::render::RenderModel;
use crate::widget::{FilterSpec, Interaction, Reaction, SharedView, WidgetAdapter};

/// Whether listeners hear about a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    #[default]
    Broadcast,
    /// Widgets are updated, listeners are not called
    Silent,
}

struct CustomFilter {
    field: String,
    dimension: DimensionId,
}

pub struct FilterPanel {
    engine: Crossfilter,
    widgets: IndexMap<String, Box<dyn WidgetAdapter>>,
    custom_filters: IndexMap<String, CustomFilter>,
    listeners: ListenerRegistry,
    debouncers: AHashMap<String, Debouncer<Interaction>>,
    result: FilteredResult,
    broadcasting: bool,
    resetting: bool,
}

impl FilterPanel {
    /// Create a new panel over `records`
    pub fn new(records: Vec<Record>) -> Result<Self> {
        let engine = Crossfilter::from_records(records)?;
        let result = FilteredResult::new(engine.all_passing_ids(), None);
        tracing::info!("Created filter panel over {} records", engine.size());
        Ok(Self {
            engine,
            widgets: IndexMap::new(),
            custom_filters: IndexMap::new(),
            listeners: ListenerRegistry::new(),
            debouncers: AHashMap::new(),
            result,
            broadcasting: false,
            resetting: false,
        })
    }

    /// Create a panel and add the widgets of a layout
    pub fn with_layout(records: Vec<Record>, layout: Vec<WidgetDescriptor>) -> Result<Self> {
        let mut panel = Self::new(records)?;
        panel.restore_all(layout)?;
        Ok(panel)
    }

    pub fn engine(&self) -> &Crossfilter {
        &self.engine
    }

    pub fn set_columns(&mut self, columns: Vec<Column>) {
        self.engine.set_columns(columns);
    }

    pub fn columns(&self) -> Vec<Column> {
        self.engine.store().columns()
    }

    /// The last computed live set
    pub fn filtered_result(&self) -> &FilteredResult {
        &self.result
    }

    pub fn widget_ids(&self) -> Vec<String> {
        self.widgets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    fn widget(&self, id: &str) -> Result<&dyn WidgetAdapter> {
        self.widgets
            .get(id)
            .map(|w| w.as_ref())
            .ok_or_else(|| FilterError::state(format!("no widget with id '{id}'")))
    }

    fn is_filtered(&self) -> bool {
        self.engine.passing_count() != self.engine.size()
    }

    // Widgets

    /// Add a widget. An id is generated when the descriptor has none.
    ///
    /// When a filter is already active the widget immediately gets a view of
    /// the current live set.
    pub fn add_widget(&mut self, mut descriptor: WidgetDescriptor) -> Result<String> {
        let id = match descriptor.id.clone() {
            Some(id) => id,
            None => format!("filter-chart-{}", Uuid::new_v4().simple()),
        };
        self.check_free_id(&id)?;
        descriptor.id = Some(id.clone());
        let adapter = build_adapter(descriptor, &mut self.engine)?;
        self.insert_adapter(id.clone(), adapter);
        Ok(id)
    }

    /// Parse and add a widget from its JSON descriptor
    pub fn add_widget_json(&mut self, descriptor: serde_json::Value) -> Result<String> {
        self.add_widget(WidgetDescriptor::from_value(descriptor)?)
    }

    /// Add an adapter built outside the registry, for widget kinds the
    /// registry does not know
    pub fn add_adapter<F>(&mut self, build: F) -> Result<String>
    where
        F: FnOnce(&mut Crossfilter) -> Result<Box<dyn WidgetAdapter>>,
    {
        let mut adapter = build(&mut self.engine)?;
        let id = adapter.id().to_string();
        let taken = if id.is_empty() {
            Err(FilterError::configuration("adapter id is empty"))
        } else {
            self.check_free_id(&id)
        };
        if let Err(e) = taken {
            adapter.dispose(&mut self.engine)?;
            return Err(e);
        }
        self.insert_adapter(id.clone(), adapter);
        Ok(id)
    }

    /// Widgets and custom filters share one id space, since either can be
    /// the origin of a broadcast
    fn check_free_id(&self, id: &str) -> Result<()> {
        if self.widgets.contains_key(id) {
            return Err(FilterError::configuration(format!("a widget with id '{id}' already exists")));
        }
        if self.custom_filters.contains_key(id) {
            return Err(FilterError::configuration(format!("a custom filter with id '{id}' already exists")));
        }
        Ok(())
    }

    fn insert_adapter(&mut self, id: String, mut adapter: Box<dyn WidgetAdapter>) {
        let reaction = if self.is_filtered() {
            adapter.apply_hidden_view(&self.engine.all_passing_ids())
        } else {
            Reaction::None
        };
        tracing::info!("Added {} '{}'", adapter.descriptor().kind.name(), id);
        self.widgets.insert(id.clone(), adapter);
        self.react(vec![(id, reaction)]);
    }

    /// Remove a widget, clearing its filter first
    pub fn remove_widget(&mut self, id: &str) -> Result<()> {
        if self.detach_widget(id)? {
            self.broadcast(None, Propagation::Broadcast);
        }
        Ok(())
    }

    /// Dispose and unregister a widget; returns whether it held a filter
    fn detach_widget(&mut self, id: &str) -> Result<bool> {
        let adapter = self
            .widgets
            .get_mut(id)
            .ok_or_else(|| FilterError::state(format!("no widget with id '{id}'")))?;
        let had_filter = adapter.has_filter(&self.engine);
        adapter.dispose(&mut self.engine)?;
        self.widgets.shift_remove(id);
        self.debouncers.remove(id);
        tracing::info!("Removed widget '{}'", id);
        Ok(had_filter)
    }

    pub fn describe_widget(&self, id: &str) -> Result<WidgetDescriptor> {
        Ok(self.widget(id)?.descriptor().clone())
    }

    pub fn describe_all(&self) -> Vec<WidgetDescriptor> {
        self.widgets.values().map(|w| w.descriptor().clone()).collect()
    }

    /// Replace every widget with the given layout. All descriptors are
    /// validated before anything is removed.
    pub fn restore_all(&mut self, descriptors: Vec<WidgetDescriptor>) -> Result<Vec<String>> {
        let mut seen = BTreeSet::new();
        for descriptor in &descriptors {
            validate(descriptor, &self.engine)?;
            if let Some(id) = &descriptor.id {
                if !seen.insert(id.clone()) {
                    return Err(FilterError::configuration(format!("duplicate widget id '{id}' in layout")));
                }
                if self.custom_filters.contains_key(id) {
                    return Err(FilterError::configuration(format!("a custom filter with id '{id}' already exists")));
                }
            }
        }

        let had_filter = self.is_filtered();
        for id in self.widget_ids() {
            self.detach_widget(&id)?;
        }
        let ids = descriptors
            .into_iter()
            .map(|d| self.add_widget(d))
            .collect::<Result<Vec<_>>>()?;
        if had_filter {
            self.broadcast(None, Propagation::Broadcast);
        }
        Ok(ids)
    }

    /// Change a widget's options; they must be of the widget's own kind.
    /// The widget's filter is kept.
    pub fn set_parameters(&mut self, id: &str, options: WidgetKind) -> Result<()> {
        let current = &self.widget(id)?.descriptor().kind;
        if !current.same_kind(&options) {
            return Err(FilterError::configuration(format!(
                "cannot apply {} options to {} '{id}'",
                options.name(),
                current.name()
            )));
        }
        let mut descriptor = self.describe_widget(id)?;
        descriptor.kind = options;
        self.rebuild(id, descriptor)?;
        self.broadcast(None, Propagation::Broadcast);
        Ok(())
    }

    /// Color a widget by a field, or stop coloring it
    pub fn set_color_by(&mut self, id: &str, color_by: Option<ColorBy>) -> Result<()> {
        let mut descriptor = self.describe_widget(id)?;
        descriptor.color_by = color_by;
        self.rebuild(id, descriptor)?;
        self.broadcast(None, Propagation::Broadcast);
        Ok(())
    }

    /// Rebuild a widget's dimensions from a descriptor, replaying its filter
    fn rebuild(&mut self, id: &str, descriptor: WidgetDescriptor) -> Result<()> {
        validate(&descriptor, &self.engine)?;
        self.replace_adapter(id, |engine| build_adapter(descriptor, engine))
    }

    /// Swap a widget's adapter for a new one carrying the same filter. The
    /// old adapter is released only once the new one has taken the filter;
    /// on error the widget is left as it was.
    fn replace_adapter<F>(&mut self, id: &str, build: F) -> Result<()>
    where
        F: FnOnce(&mut Crossfilter) -> Result<Box<dyn WidgetAdapter>>,
    {
        let specs = self.widget(id)?.active_filters(&self.engine);
        let mut fresh = build(&mut self.engine)?;
        if let Err(e) = fresh.replay(&mut self.engine, &specs) {
            if let Err(cleanup) = fresh.dispose(&mut self.engine) {
                tracing::error!("Failed to release replacement for '{}': {}", id, cleanup);
            }
            tracing::warn!("Kept widget '{}' unchanged: {}", id, e);
            return Err(e);
        }

        if let Some(mut old) = self.widgets.insert(id.to_string(), fresh) {
            old.dispose(&mut self.engine)?;
        }
        tracing::debug!("Rebuilt widget '{}' replaying {} filters", id, specs.len());
        Ok(())
    }

    pub fn render(&self, id: &str) -> Result<RenderModel> {
        self.widget(id)?.render(&self.engine)
    }

    /// Shared view state of a widget, for an external renderer
    pub fn view(&self, id: &str) -> Result<SharedView> {
        Ok(self.widget(id)?.view())
    }

    // Filtering

    /// Apply a user gesture on a widget and broadcast the result
    pub fn interact(&mut self, id: &str, interaction: Interaction) -> Result<bool> {
        self.commit(id, interaction)
    }

    fn commit(&mut self, id: &str, interaction: Interaction) -> Result<bool> {
        let adapter = self
            .widgets
            .get_mut(id)
            .ok_or_else(|| FilterError::state(format!("no widget with id '{id}'")))?;
        let changed = adapter.interact(&mut self.engine, interaction)?;
        if changed {
            self.broadcast(Some(id), Propagation::Broadcast);
        }
        Ok(changed)
    }

    /// Debounced [`FilterPanel::interact`] for range drags. At most one
    /// gesture per window is committed; call [`FilterPanel::settle`] to
    /// commit the last one once the drag stops.
    pub fn drag(&mut self, id: &str, interaction: Interaction, now: Instant) -> Result<bool> {
        self.widget(id)?;
        let ready = self
            .debouncers
            .entry(id.to_string())
            .or_default()
            .offer(interaction, now);
        match ready {
            Some(interaction) => self.commit(id, interaction),
            None => Ok(false),
        }
    }

    /// Commit pending drags whose window has passed
    pub fn settle(&mut self, now: Instant) -> Result<usize> {
        let ready: Vec<(String, Interaction)> = self
            .debouncers
            .iter_mut()
            .filter_map(|(id, d)| d.poll(now).map(|i| (id.clone(), i)))
            .collect();
        let count = ready.len();
        for (id, interaction) in ready {
            self.commit(&id, interaction)?;
        }
        Ok(count)
    }

    /// Recompute the live set and push it out. `origin` names the widget or
    /// custom filter whose predicate changed.
    pub fn notify_filter_changed(&mut self, origin: Option<&str>, propagation: Propagation) -> Result<()> {
        if let Some(origin) = origin {
            if !self.widgets.contains_key(origin) && !self.custom_filters.contains_key(origin) {
                return Err(FilterError::state(format!("unknown filter origin '{origin}'")));
            }
        }
        self.broadcast(origin, propagation);
        Ok(())
    }

    fn origin_dimensions(&self, origin: Option<&str>) -> Vec<DimensionId> {
        match origin {
            Some(id) => match (self.widgets.get(id), self.custom_filters.get(id)) {
                (Some(widget), _) => widget.dimensions(),
                (None, Some(custom)) => vec![custom.dimension],
                _ => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    fn broadcast(&mut self, origin: Option<&str>, propagation: Propagation) {
        if self.resetting {
            return;
        }
        if self.broadcasting {
            tracing::warn!("Suppressed re-entrant filter broadcast from {:?}", origin);
            return;
        }
        self.broadcasting = true;

        let all = self.engine.all_passing_ids();

        let mut reactions = Vec::new();
        for (id, adapter) in self.widgets.iter_mut() {
            let reaction = if Some(id.as_str()) == origin {
                adapter.apply_own_view(&all)
            } else {
                let dimensions = adapter.dimensions();
                let hidden = match self.engine.passing_ids_excluding(&dimensions) {
                    Ok(ids) => ids,
                    Err(e) => {
                        tracing::warn!("Widget '{}' has no live dimensions: {}", id, e);
                        all.clone()
                    }
                };
                adapter.apply_hidden_view(&hidden)
            };
            reactions.push((id.clone(), reaction));
        }
        self.react(reactions);

        let all = self.engine.all_passing_ids();
        let live = self.passing_excluding(&self.origin_dimensions(origin), &all);
        self.result = FilteredResult::new(live, origin.map(str::to_string));
        tracing::debug!("Broadcast {} live records (origin {:?})", self.result.count, origin);
        if propagation == Propagation::Broadcast {
            self.listeners.publish(&self.result);
        }
        self.broadcasting = false;
    }

    fn passing_excluding(&self, dimensions: &[DimensionId], all: &BTreeSet<RecordId>) -> BTreeSet<RecordId> {
        if dimensions.is_empty() {
            return all.clone();
        }
        self.engine.passing_ids_excluding(dimensions).unwrap_or_else(|e| {
            tracing::warn!("Falling back to the full live set: {}", e);
            all.clone()
        })
    }

    /// Commit the interactions widgets asked for while views were applied.
    /// Inside a broadcast the resulting broadcasts are suppressed.
    fn react(&mut self, reactions: Vec<(String, Reaction)>) {
        for (id, reaction) in reactions {
            if let Reaction::Refilter(interaction) = reaction {
                if let Err(e) = self.commit(&id, interaction) {
                    tracing::warn!("Widget '{}' failed to refilter: {}", id, e);
                }
            }
        }
    }

    /// Clear every widget and custom filter, then broadcast once
    pub fn reset_all(&mut self) {
        self.resetting = true;
        for id in self.widget_ids() {
            let clearable = self.widgets.get(&id).is_some_and(|w| w.can_filter());
            if clearable {
                if let Err(e) = self.commit(&id, Interaction::Clear) {
                    tracing::warn!("Could not clear widget '{}': {}", id, e);
                }
            }
        }
        for (id, custom) in &self.custom_filters {
            if let Err(e) = self.engine.filter(custom.dimension, None) {
                tracing::warn!("Could not clear custom filter '{}': {}", id, e);
            }
        }
        for debouncer in self.debouncers.values_mut() {
            debouncer.flush();
        }
        self.resetting = false;
        tracing::info!("Reset all filters");
        self.broadcast(None, Propagation::Broadcast);
    }

    // Custom filters

    /// Create or replace a filter that is not tied to a widget
    pub fn register_custom_filter(
        &mut self,
        id: &str,
        field: &str,
        predicate: Predicate,
        propagation: Propagation,
    ) -> Result<()> {
        if self.widgets.contains_key(id) {
            return Err(FilterError::configuration(format!("a widget with id '{id}' already exists")));
        }
        self.engine.store().require_field(field)?;
        let dimension = match self.custom_filters.get(id) {
            Some(existing) if existing.field == field => existing.dimension,
            Some(existing) => {
                let stale = existing.dimension;
                self.engine.dispose_dimension(stale)?;
                self.engine.field_dimension(field)?
            }
            None => self.engine.field_dimension(field)?,
        };
        self.engine.filter(dimension, Some(predicate))?;
        self.custom_filters.insert(
            id.to_string(),
            CustomFilter {
                field: field.to_string(),
                dimension,
            },
        );
        tracing::debug!("Registered custom filter '{}' on '{}'", id, field);
        self.broadcast(None, propagation);
        Ok(())
    }

    pub fn unregister_custom_filter(&mut self, id: &str, propagation: Propagation) -> Result<()> {
        let custom = self
            .custom_filters
            .shift_remove(id)
            .ok_or_else(|| FilterError::state(format!("no custom filter with id '{id}'")))?;
        self.engine.dispose_dimension(custom.dimension)?;
        tracing::debug!("Removed custom filter '{}'", id);
        self.broadcast(None, propagation);
        Ok(())
    }

    // Listeners

    pub fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&FilteredResult) + Send + Sync + 'static,
    {
        self.listeners.add(listener_from_fn(listener))
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> Result<()> {
        if self.listeners.remove(id) {
            Ok(())
        } else {
            Err(FilterError::state(format!("{id} is not registered")))
        }
    }

    // Filter snapshots

    /// Every widget filter, exported. Custom filters are not included.
    pub fn get_active_filters(&self) -> Vec<FilterSpec> {
        self.widgets
            .values()
            .flat_map(|w| w.active_filters(&self.engine))
            .collect()
    }

    /// Re-apply exported filters to the widgets plotting their fields, then
    /// broadcast once
    pub fn replay_filters(&mut self, specs: &[FilterSpec], propagation: Propagation) -> Result<()> {
        for spec in specs {
            if !self.widgets.values().any(|w| w.descriptor().param.contains(&spec.field)) {
                tracing::warn!("No widget plots '{}', skipping its filter", spec.field);
            }
        }
        let mut changed = false;
        for adapter in self.widgets.values_mut() {
            changed |= adapter.replay(&mut self.engine, specs)?;
        }
        if changed {
            self.broadcast(None, propagation);
        }
        Ok(())
    }

    // Data

    /// Append records; dimensions are updated under their current
    /// predicates and one broadcast follows
    pub fn add_records(&mut self, records: Vec<Record>, propagation: Propagation) -> Result<Range<usize>> {
        let range = self.engine.add(records)?;
        tracing::info!("Appended {} records", range.len());
        self.broadcast(None, propagation);
        Ok(range)
    }

    /// Drop a field: widgets plotting it are removed and colorings by it
    /// are cleared
    pub fn remove_field(&mut self, field: &str) -> Result<()> {
        let plotting: Vec<String> = self
            .widgets
            .iter()
            .filter(|(_, w)| w.descriptor().param.contains(field))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &plotting {
            self.detach_widget(id)?;
        }

        let coloring: Vec<String> = self
            .widgets
            .iter()
            .filter(|(_, w)| w.descriptor().color_by.as_ref().is_some_and(|c| c.field == field))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &coloring {
            let mut descriptor = self.describe_widget(id)?;
            descriptor.color_by = None;
            self.rebuild(id, descriptor)?;
        }

        self.engine.remove_column(field);
        tracing::info!(
            "Removed field '{}': {} widgets dropped, {} recolored",
            field,
            plotting.len(),
            coloring.len()
        );
        if !plotting.is_empty() || !coloring.is_empty() {
            self.broadcast(None, Propagation::Broadcast);
        }
        Ok(())
    }

    /// Rebuild the widgets that read `field`, keeping their filters
    pub fn data_changed(&mut self, field: &str, propagation: Propagation) -> Result<()> {
        let affected: Vec<WidgetDescriptor> = self
            .widgets
            .values()
            .map(|w| w.descriptor())
            .filter(|d| d.fields().contains(&field))
            .cloned()
            .collect();
        for descriptor in affected {
            let id = descriptor.id.clone().unwrap_or_default();
            self.rebuild(&id, descriptor)?;
        }
        self.broadcast(None, propagation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{BarOptions, RowOptions};
    use crate::widget::new_view;
    use fp_data::Key;

    /// Takes a predicate on replay and then fails
    struct RejectingReplay {
        descriptor: WidgetDescriptor,
        dimension: DimensionId,
        view: SharedView,
    }

    impl WidgetAdapter for RejectingReplay {
        fn descriptor(&self) -> &WidgetDescriptor {
            &self.descriptor
        }

        fn dimensions(&self) -> Vec<DimensionId> {
            vec![self.dimension]
        }

        fn interact(&mut self, _engine: &mut Crossfilter, _interaction: Interaction) -> Result<bool> {
            Ok(false)
        }

        fn active_filters(&self, _engine: &Crossfilter) -> Vec<FilterSpec> {
            Vec::new()
        }

        fn replay(&mut self, engine: &mut Crossfilter, _specs: &[FilterSpec]) -> Result<bool> {
            engine.filter(self.dimension, Some(Predicate::range(0, 1)))?;
            Err(FilterError::configuration("replay rejected"))
        }

        fn render(&self, _engine: &Crossfilter) -> Result<RenderModel> {
            Err(FilterError::state("not rendered"))
        }

        fn view(&self) -> SharedView {
            self.view.clone()
        }
    }

    #[test]
    fn test_failed_rebuild_leaves_widget_untouched() {
        let records = [20, 35, 50].into_iter().map(|age| Record::new().with("age", age)).collect();
        let mut panel = FilterPanel::new(records).unwrap();
        let descriptor = WidgetDescriptor::new(WidgetKind::BarChart(BarOptions::default()), "age").with_id("age");
        panel.add_widget(descriptor).unwrap();
        panel
            .interact("age", Interaction::Brush { min: Key::from(30), max: Key::from(60) })
            .unwrap();
        let dimensions = panel.engine().dimension_count();
        let groups = panel.engine().group_count();
        let live = panel.engine().all_passing_ids();
        let filters = panel.get_active_filters();

        let err = panel
            .replace_adapter("age", |engine| {
                let dimension = engine.field_dimension("age")?;
                let descriptor = WidgetDescriptor::new(WidgetKind::RowChart(RowOptions::default()), "age").with_id("age");
                Ok(Box::new(RejectingReplay {
                    descriptor,
                    dimension,
                    view: new_view(),
                }) as Box<dyn WidgetAdapter>)
            })
            .unwrap_err();

        assert!(err.is_configuration());
        assert_eq!(panel.engine().dimension_count(), dimensions);
        assert_eq!(panel.engine().group_count(), groups);
        assert_eq!(panel.engine().all_passing_ids(), live);
        assert_eq!(panel.get_active_filters(), filters);
        assert!(matches!(panel.describe_widget("age").unwrap().kind, WidgetKind::BarChart(_)));
        assert!(matches!(panel.render("age").unwrap(), RenderModel::Bars { .. }));
    }
}
