//! Scatter plot over two numeric fields, filtered with a rectangular region

use fp_core::{Crossfilter, DimensionId, FilterError, Predicate, Result};
use fp_data::{Key, Record};

use crate::descriptor::{AxisDirection, ScatterOptions, WidgetDescriptor, WidgetKind};
use crate::render::{RenderModel, ScatterPoint};
use crate::widget::{new_view, FilterSpec, Interaction, SharedView, WidgetAdapter};

/// Closed rectangle in data space (log10 space on log axes)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x: (f64, f64),
    pub y: (f64, f64),
}

impl Region {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x.0 && x <= self.x.1 && y >= self.y.0 && y <= self.y.1
    }

    /// Whether a `[x, y]` key falls inside; missing coordinates never do
    pub fn contains_key(&self, key: &Key) -> bool {
        match (key.component(0).and_then(Key::as_f64), key.component(1).and_then(Key::as_f64)) {
            (Some(x), Some(y)) => self.contains(x, y),
            _ => false,
        }
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn scaled(value: Option<f64>, log: bool) -> f64 {
    match value {
        Some(v) if log => {
            if v > 0.0 {
                v.log10()
            } else {
                f64::NAN
            }
        }
        Some(v) => v,
        None => f64::NAN,
    }
}

pub struct ScatterPlot {
    descriptor: WidgetDescriptor,
    options: ScatterOptions,
    dimension: DimensionId,
    region: Option<Region>,
    view: SharedView,
}

impl ScatterPlot {
    pub fn build(descriptor: WidgetDescriptor, engine: &mut Crossfilter) -> Result<Self> {
        let WidgetKind::ScatterPlot(options) = descriptor.kind.clone() else {
            return Err(FilterError::configuration("not a scatter plot descriptor"));
        };
        let (x, y) = match (descriptor.param.get(0), descriptor.param.get(1)) {
            (Some(x), Some(y)) => (x.to_string(), y.to_string()),
            _ => return Err(FilterError::configuration("scatter plot needs two fields")),
        };
        let (x_log, y_log) = (options.x_log_scale, options.y_log_scale);
        let dimension = engine.dimension(move |r: &Record| {
            Key::pair(
                Key::number(scaled(r.get(&x).as_f64(), x_log)),
                Key::number(scaled(r.get(&y).as_f64(), y_log)),
            )
        });

        Ok(Self {
            descriptor,
            options,
            dimension,
            region: None,
            view: new_view(),
        })
    }

    /// Region in data space for a brush given in the widget's axis space
    pub fn region_for(&self, x: (f64, f64), y: (f64, f64)) -> Region {
        let y = match self.options.y_axis {
            AxisDirection::Up => ordered(y.0, y.1),
            AxisDirection::Down => ordered(-y.0, -y.1),
        };
        Region { x: ordered(x.0, x.1), y }
    }

    pub fn region(&self) -> Option<Region> {
        self.region
    }

    fn fields(&self) -> (&str, &str) {
        (
            self.descriptor.param.get(0).unwrap_or_default(),
            self.descriptor.param.get(1).unwrap_or_default(),
        )
    }

    fn unscale(&self, (lo, hi): (f64, f64), log: bool) -> (Key, Key) {
        if log {
            (Key::number(10f64.powf(lo)), Key::number(10f64.powf(hi)))
        } else {
            (Key::number(lo), Key::number(hi))
        }
    }

    fn rescale(&self, (lo, hi): (f64, f64), log: bool) -> (f64, f64) {
        if log {
            (scaled(Some(lo), true), scaled(Some(hi), true))
        } else {
            (lo, hi)
        }
    }
}

impl WidgetAdapter for ScatterPlot {
    fn descriptor(&self) -> &WidgetDescriptor {
        &self.descriptor
    }

    fn dimensions(&self) -> Vec<DimensionId> {
        vec![self.dimension]
    }

    fn interact(&mut self, engine: &mut Crossfilter, interaction: Interaction) -> Result<bool> {
        let region = match interaction {
            Interaction::Region { x, y } => Some(self.region_for(x, y)),
            Interaction::Clear => None,
            other => {
                return Err(FilterError::configuration(format!(
                    "a scatter plot cannot be filtered with {other:?}"
                )))
            }
        };
        if region == self.region {
            return Ok(false);
        }
        let predicate = region.map(|r| Predicate::custom(move |key| r.contains_key(key)));
        let changed = engine.filter(self.dimension, predicate)?;
        self.region = region;
        Ok(changed)
    }

    fn active_filters(&self, _engine: &Crossfilter) -> Vec<FilterSpec> {
        let Some(region) = self.region else {
            return Vec::new();
        };
        let (x_field, y_field) = self.fields();
        let (x0, x1) = self.unscale(region.x, self.options.x_log_scale);
        let (y0, y1) = self.unscale(region.y, self.options.y_log_scale);
        vec![FilterSpec::between(x_field, &x0, &x1), FilterSpec::between(y_field, &y0, &y1)]
    }

    fn replay(&mut self, engine: &mut Crossfilter, specs: &[FilterSpec]) -> Result<bool> {
        let (x_field, y_field) = self.fields();
        let bounds = |field: &str| {
            specs
                .iter()
                .filter(|s| s.field == field)
                .find_map(FilterSpec::bounds)
                .and_then(|(lo, hi)| Some((lo.as_f64()?, hi.as_f64()?)))
        };
        let (Some(x), Some(y)) = (bounds(x_field), bounds(y_field)) else {
            return Ok(false);
        };
        let x = self.rescale(x, self.options.x_log_scale);
        let (y0, y1) = self.rescale(y, self.options.y_log_scale);
        let y = match self.options.y_axis {
            AxisDirection::Up => (y0, y1),
            AxisDirection::Down => (-y1, -y0),
        };
        self.interact(engine, Interaction::Region { x, y })
    }

    fn render(&self, engine: &Crossfilter) -> Result<RenderModel> {
        let (x_field, y_field) = self.fields();
        let color_field = self.descriptor.color_by.as_ref().map(|c| c.field.as_str());
        let view = self.view.read();
        let points = engine
            .store()
            .snapshot()
            .iter()
            .filter_map(|r| {
                Some(ScatterPoint {
                    id: r.id(),
                    x: r.get(x_field).as_f64()?,
                    y: r.get(y_field).as_f64()?,
                    visible: view.is_visible(r.id()),
                    category: color_field.map(|f| r.get(f).to_string()),
                })
            })
            .collect();
        Ok(RenderModel::Scatter { points })
    }

    fn view(&self) -> SharedView {
        self.view.clone()
    }
}
