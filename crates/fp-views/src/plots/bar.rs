//! Bar chart: a numeric histogram brushed with a range

use fp_core::{Count, Crossfilter, DimensionId, FilterError, GroupHandle, Result, Stacked};
use fp_data::{Key, Record};

use crate::descriptor::{BarOptions, WidgetDescriptor, WidgetKind};
use crate::render::{Bin, RenderModel};
use crate::widget::{new_view, FilterSpec, Interaction, SharedView, WidgetAdapter};

use super::{range_filters, range_predicate, replay_range};

/// Bin geometry of a histogram over `[display_min, display_max]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bins {
    pub display_min: f64,
    pub display_max: f64,
    pub width: f64,
}

impl Bins {
    pub fn new(display_min: f64, display_max: f64, bin_number: usize) -> Self {
        let width = (display_max - display_min) / bin_number.max(1) as f64;
        Self {
            display_min,
            display_max,
            width: if width > 0.0 && width.is_finite() { width } else { 1.0 },
        }
    }

    /// Dimension value for a raw value. Missing values go strictly below the
    /// display range; values at or above the top land in the last bin.
    pub fn clamp(&self, value: Option<f64>) -> f64 {
        match value {
            None => self.display_min - self.width - 1.0,
            Some(v) if v >= self.display_max => self.display_max - self.width / 10.0,
            Some(v) if v < self.display_min => self.display_min,
            Some(v) => v,
        }
    }

    /// Lower edge of the bin holding `value`
    pub fn bin(&self, value: f64) -> f64 {
        self.width * (value / self.width).floor()
    }

    fn is_displayed(&self, x0: f64) -> bool {
        x0 + self.width > self.display_min && x0 <= self.display_max
    }
}

enum BarMeasure {
    Count(GroupHandle<Count>),
    Stacked(GroupHandle<Stacked>),
}

pub struct BarChart {
    descriptor: WidgetDescriptor,
    options: BarOptions,
    bins: Bins,
    dimension: DimensionId,
    measure: BarMeasure,
    categories: Vec<String>,
    view: SharedView,
}

impl BarChart {
    /// Create a new bar chart. Display bounds default to the field's extent
    /// and are written back into the descriptor.
    pub fn build(mut descriptor: WidgetDescriptor, engine: &mut Crossfilter) -> Result<Self> {
        let WidgetKind::BarChart(mut options) = descriptor.kind.clone() else {
            return Err(FilterError::configuration("not a bar chart descriptor"));
        };
        let field = descriptor
            .param
            .first()
            .ok_or_else(|| FilterError::configuration("bar chart needs a field"))?
            .to_string();

        let (lo, hi) = engine.store().min_max(&field).unwrap_or((0.0, 0.0));
        let display_min = *options.display_min.get_or_insert(lo);
        let display_max = *options.display_max.get_or_insert(hi);
        let bins = Bins::new(display_min, display_max, options.bin_number);
        descriptor.kind = WidgetKind::BarChart(options.clone());

        let accessor = field.clone();
        let dimension = engine.dimension(move |r: &Record| Key::number(bins.clamp(r.get(&accessor).as_f64())));
        let bin_key = move |k: &Key| Key::number(bins.bin(k.as_f64().unwrap_or(bins.display_min)));

        let (measure, categories) = match &descriptor.color_by {
            Some(color_by) => {
                let categories: Vec<String> = color_by.value_to_color.keys().cloned().collect();
                let reducer = Stacked::new(color_by.field.clone(), categories.iter().cloned());
                let handle = engine.group(dimension, bin_key, reducer)?;
                let mut labels = categories;
                labels.push(Stacked::OTHER.to_string());
                (BarMeasure::Stacked(handle), labels)
            }
            None => (BarMeasure::Count(engine.group(dimension, bin_key, Count)?), Vec::new()),
        };

        Ok(Self {
            descriptor,
            options,
            bins,
            dimension,
            measure,
            categories,
            view: new_view(),
        })
    }

    pub fn bins(&self) -> Bins {
        self.bins
    }

    fn field(&self) -> &str {
        self.descriptor.param.first().unwrap_or_default()
    }
}

impl WidgetAdapter for BarChart {
    fn descriptor(&self) -> &WidgetDescriptor {
        &self.descriptor
    }

    fn dimensions(&self) -> Vec<DimensionId> {
        vec![self.dimension]
    }

    fn interact(&mut self, engine: &mut Crossfilter, interaction: Interaction) -> Result<bool> {
        engine.filter(self.dimension, range_predicate(interaction)?)
    }

    fn active_filters(&self, engine: &Crossfilter) -> Vec<FilterSpec> {
        range_filters(engine, self.dimension, self.field())
    }

    fn replay(&mut self, engine: &mut Crossfilter, specs: &[FilterSpec]) -> Result<bool> {
        let field = self.field().to_string();
        replay_range(engine, self.dimension, &field, specs)
    }

    fn render(&self, engine: &Crossfilter) -> Result<RenderModel> {
        let bins = match &self.measure {
            BarMeasure::Count(handle) => engine
                .entries(handle)?
                .into_iter()
                .filter_map(|e| {
                    let x0 = e.key.as_f64()?;
                    Some(Bin {
                        x0,
                        width: self.bins.width,
                        value: e.value as f64,
                        stack: None,
                    })
                })
                .collect::<Vec<_>>(),
            BarMeasure::Stacked(handle) => engine
                .entries(handle)?
                .into_iter()
                .filter_map(|e| {
                    let x0 = e.key.as_f64()?;
                    Some(Bin {
                        x0,
                        width: self.bins.width,
                        value: e.value.total(),
                        stack: Some(e.value),
                    })
                })
                .collect(),
        };
        Ok(RenderModel::Bars {
            bins: bins.into_iter().filter(|b| self.bins.is_displayed(b.x0)).collect(),
            display_min: self.bins.display_min,
            display_max: self.bins.display_max,
            max_y: self.options.max_y,
            categories: self.categories.clone(),
        })
    }

    fn view(&self) -> SharedView {
        self.view.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_edges() {
        let bins = Bins::new(0.0, 100.0, 10);
        assert_eq!(bins.width, 10.0);
        assert_eq!(bins.clamp(Some(100.0)), 99.0);
        assert_eq!(bins.clamp(Some(250.0)), 99.0);
        assert_eq!(bins.clamp(Some(-3.0)), 0.0);
        assert_eq!(bins.clamp(None), -11.0);
        assert_eq!(bins.bin(bins.clamp(Some(100.0))), 90.0);
        assert!(!bins.is_displayed(bins.bin(bins.clamp(None))));
    }

    #[test]
    fn test_degenerate_range_uses_unit_bins() {
        let bins = Bins::new(5.0, 5.0, 10);
        assert_eq!(bins.width, 1.0);
    }
}
