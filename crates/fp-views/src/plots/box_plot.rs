//! Box plot of a value field per category, or of several value columns

use ahash::AHashSet;
use fp_core::{Crossfilter, DimensionId, FilterError, GroupHandle, Result, SortedValues};
use fp_data::{Key, Record};

use crate::descriptor::{WidgetDescriptor, WidgetKind};
use crate::render::{BoxSummary, RenderModel};
use crate::widget::{new_view, FilterSpec, Interaction, SharedView, WidgetAdapter};

use super::Selection;

/// Label of records with no category
pub const BOX_MISSING: &str = "None";
/// Label of the categories beyond the cap
pub const BOX_OTHER: &str = "Other";

enum Layout {
    /// One box per category of the first param
    Categories {
        field: String,
        group: GroupHandle<SortedValues>,
        selection: Selection,
    },
    /// One box per value column, over every passing record
    Columns(Vec<(String, GroupHandle<SortedValues>)>),
}

pub struct BoxPlot {
    descriptor: WidgetDescriptor,
    dimension: DimensionId,
    layout: Layout,
    view: SharedView,
}

impl BoxPlot {
    pub fn build(descriptor: WidgetDescriptor, engine: &mut Crossfilter) -> Result<Self> {
        let WidgetKind::BoxPlot(options) = &descriptor.kind else {
            return Err(FilterError::configuration("not a box plot descriptor"));
        };
        let fields: Vec<String> = descriptor.param.fields().into_iter().map(str::to_string).collect();

        let (dimension, layout) = if fields.len() == 2 {
            let (category, value) = (fields[0].clone(), fields[1].clone());
            let top: AHashSet<String> = engine
                .store()
                .frequencies(&category)
                .into_iter()
                .filter(|(key, _)| !key.is_missing())
                .take(options.cap)
                .map(|(key, _)| key.to_string())
                .collect();

            let accessor = category.clone();
            let dimension = engine.dimension(move |r: &Record| {
                let value = r.get(&accessor);
                if value.is_missing() {
                    return Key::text(BOX_MISSING);
                }
                let label = value.to_key().to_string();
                if top.contains(&label) {
                    Key::text(label)
                } else {
                    Key::text(BOX_OTHER)
                }
            });
            let group = engine.group_by_key(dimension, SortedValues::new(value))?;
            let layout = Layout::Categories {
                field: category,
                group,
                selection: Selection::default(),
            };
            (dimension, layout)
        } else {
            let dimension = engine.field_dimension(&fields[0])?;
            let columns = fields
                .iter()
                .map(|f| Ok((f.clone(), engine.group_all(dimension, SortedValues::new(f.clone()))?)))
                .collect::<Result<Vec<_>>>()?;
            (dimension, Layout::Columns(columns))
        };

        Ok(Self {
            descriptor,
            dimension,
            layout,
            view: new_view(),
        })
    }
}

impl WidgetAdapter for BoxPlot {
    fn descriptor(&self) -> &WidgetDescriptor {
        &self.descriptor
    }

    fn dimensions(&self) -> Vec<DimensionId> {
        vec![self.dimension]
    }

    fn can_filter(&self) -> bool {
        matches!(self.layout, Layout::Categories { .. })
    }

    fn interact(&mut self, engine: &mut Crossfilter, interaction: Interaction) -> Result<bool> {
        match &mut self.layout {
            Layout::Categories { selection, .. } => selection.commit(engine, self.dimension, interaction),
            Layout::Columns(_) => match interaction {
                Interaction::Clear => Ok(false),
                _ => Err(FilterError::configuration("a box plot over several columns cannot be filtered")),
            },
        }
    }

    fn active_filters(&self, _engine: &Crossfilter) -> Vec<FilterSpec> {
        match &self.layout {
            Layout::Categories { field, selection, .. } if !selection.is_empty() => {
                vec![FilterSpec::equals(field.clone(), selection.keys())]
            }
            _ => Vec::new(),
        }
    }

    fn replay(&mut self, engine: &mut Crossfilter, specs: &[FilterSpec]) -> Result<bool> {
        match &mut self.layout {
            Layout::Categories { field, selection, .. } => selection.replay(engine, self.dimension, field, specs),
            Layout::Columns(_) => Ok(false),
        }
    }

    fn render(&self, engine: &Crossfilter) -> Result<RenderModel> {
        let boxes = match &self.layout {
            Layout::Categories { group, .. } => engine
                .entries(group)?
                .into_iter()
                .filter_map(|e| BoxSummary::from_sorted(e.key.to_string(), &e.value))
                .collect(),
            Layout::Columns(columns) => columns
                .iter()
                .map(|(field, group)| Ok(BoxSummary::from_sorted(field.clone(), &engine.group_all_value(group)?)))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .flatten()
                .collect(),
        };
        Ok(RenderModel::Boxes { boxes })
    }

    fn view(&self) -> SharedView {
        self.view.clone()
    }
}
