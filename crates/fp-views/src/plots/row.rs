//! Row chart: category counts or sums, filtered by clicking categories

use fp_core::{Crossfilter, DimensionId, FilterError, Result};
use fp_data::{Key, Record};

use crate::descriptor::{WidgetDescriptor, WidgetKind};
use crate::render::RenderModel;
use crate::widget::{new_view, FilterSpec, Interaction, SharedView, WidgetAdapter};

use super::{capped_rows, category_key, Measure, Selection};

/// Label of records with no value in a row chart
pub const ROW_MISSING: &str = "none";

/// How a category chart turns a field into categories
#[derive(Debug, Clone)]
pub(crate) struct CategoryStyle {
    pub cap: usize,
    pub delimiter: Option<String>,
    pub missing: &'static str,
}

/// Category chart shared by the row and ring kinds
pub struct RowChart {
    descriptor: WidgetDescriptor,
    cap: usize,
    dimension: DimensionId,
    measure: Measure,
    selection: Selection,
    view: SharedView,
}

impl RowChart {
    pub fn build(descriptor: WidgetDescriptor, engine: &mut Crossfilter) -> Result<Self> {
        let WidgetKind::RowChart(options) = &descriptor.kind else {
            return Err(FilterError::configuration("not a row chart descriptor"));
        };
        let style = CategoryStyle {
            cap: options.cap,
            delimiter: options.delimiter.clone(),
            missing: ROW_MISSING,
        };
        Self::with_style(descriptor, engine, style)
    }

    pub(crate) fn with_style(descriptor: WidgetDescriptor, engine: &mut Crossfilter, style: CategoryStyle) -> Result<Self> {
        let field = descriptor
            .param
            .first()
            .ok_or_else(|| FilterError::configuration("category chart needs a field"))?
            .to_string();
        let missing = style.missing;

        let dimension = match style.delimiter {
            Some(delimiter) => engine.dimension_many(move |r: &Record| {
                let value = r.get(&field);
                match value.as_str() {
                    Some(text) if !value.is_missing() => text
                        .split(delimiter.as_str())
                        .map(|part| if part.is_empty() { Key::text(missing) } else { Key::text(part) })
                        .collect(),
                    _ => vec![category_key(value, missing)],
                }
            }),
            None => engine.dimension(move |r: &Record| category_key(r.get(&field), missing)),
        };
        let measure = Measure::build(engine, dimension, Key::clone, descriptor.param.get(1))?;

        Ok(Self {
            descriptor,
            cap: style.cap,
            dimension,
            measure,
            selection: Selection::default(),
            view: new_view(),
        })
    }

    fn field(&self) -> &str {
        self.descriptor.param.first().unwrap_or_default()
    }
}

impl WidgetAdapter for RowChart {
    fn descriptor(&self) -> &WidgetDescriptor {
        &self.descriptor
    }

    fn dimensions(&self) -> Vec<DimensionId> {
        vec![self.dimension]
    }

    fn interact(&mut self, engine: &mut Crossfilter, interaction: Interaction) -> Result<bool> {
        self.selection.commit(engine, self.dimension, interaction)
    }

    fn active_filters(&self, _engine: &Crossfilter) -> Vec<FilterSpec> {
        if self.selection.is_empty() {
            return Vec::new();
        }
        vec![FilterSpec::equals(self.field(), self.selection.keys())]
    }

    fn replay(&mut self, engine: &mut Crossfilter, specs: &[FilterSpec]) -> Result<bool> {
        let field = self.field().to_string();
        self.selection.replay(engine, self.dimension, &field, specs)
    }

    fn render(&self, engine: &Crossfilter) -> Result<RenderModel> {
        Ok(RenderModel::Rows {
            rows: capped_rows(self.measure.values(engine)?, self.cap, &self.selection),
        })
    }

    fn view(&self) -> SharedView {
        self.view.clone()
    }
}
