//! Serializable widget descriptors
//!
//! A descriptor is the persisted form of a widget: what it plots, where it
//! sits in the grid and its kind-specific options. Descriptors round-trip
//! through JSON with the widget kind in the `type` field.

use fp_core::{FilterError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Grid placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 4,
            height: 4,
        }
    }
}

/// The field, or fields, a widget reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    One(String),
    Many(Vec<String>),
}

impl Param {
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Param::One(field) => vec![field.as_str()],
            Param::Many(fields) => fields.iter().map(String::as_str).collect(),
        }
    }

    pub fn first(&self) -> Option<&str> {
        self.fields().into_iter().next()
    }

    pub fn get(&self, i: usize) -> Option<&str> {
        self.fields().get(i).copied()
    }

    pub fn len(&self) -> usize {
        match self {
            Param::One(_) => 1,
            Param::Many(fields) => fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields().contains(&field)
    }
}

impl From<&str> for Param {
    fn from(field: &str) -> Self {
        Param::One(field.to_string())
    }
}

impl<const N: usize> From<[&str; N]> for Param {
    fn from(fields: [&str; N]) -> Self {
        Param::Many(fields.iter().map(|f| f.to_string()).collect())
    }
}

/// Colors a widget's marks by the category of another field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorBy {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// Category value to CSS color; values not listed are drawn as "Other"
    #[serde(default)]
    pub value_to_color: IndexMap<String, String>,
}

/// Time line bucketing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInterval {
    Year,
    #[default]
    Month,
    Week,
    Day,
}

/// Direction of the vertical axis a scatter brush is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisDirection {
    /// Larger y values are higher up; brush bounds are data values
    #[default]
    Up,
    /// Screen convention; brush bounds are negated data values
    Down,
}

fn default_bin_number() -> usize {
    10
}

fn default_cap() -> usize {
    8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarOptions {
    #[serde(default = "default_bin_number")]
    pub bin_number: usize,
    /// Defaults to the field's extent when the widget is built
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_y: Option<f64>,
}

impl Default for BarOptions {
    fn default() -> Self {
        Self {
            bin_number: default_bin_number(),
            display_min: None,
            display_max: None,
            max_y: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOptions {
    #[serde(default = "default_cap")]
    pub cap: usize,
    /// Split the field into several categories on this delimiter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

impl Default for RowOptions {
    fn default() -> Self {
        Self {
            cap: default_cap(),
            delimiter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingOptions {
    #[serde(default = "default_cap")]
    pub cap: usize,
}

impl Default for RingOptions {
    fn default() -> Self {
        Self { cap: default_cap() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeLineOptions {
    #[serde(default)]
    pub interval: TimeInterval,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScatterOptions {
    #[serde(default)]
    pub x_log_scale: bool,
    #[serde(default)]
    pub y_log_scale: bool,
    #[serde(default)]
    pub y_axis: AxisDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxOptions {
    #[serde(default = "default_cap")]
    pub cap: usize,
}

impl Default for BoxOptions {
    fn default() -> Self {
        Self { cap: default_cap() }
    }
}

/// Widget kind with its options, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetKind {
    BarChart(BarOptions),
    RowChart(RowOptions),
    RingChart(RingOptions),
    TimeLineChart(TimeLineOptions),
    ScatterPlot(ScatterOptions),
    BoxPlot(BoxOptions),
}

impl WidgetKind {
    /// The `type` tag
    pub fn name(&self) -> &'static str {
        match self {
            WidgetKind::BarChart(_) => "bar_chart",
            WidgetKind::RowChart(_) => "row_chart",
            WidgetKind::RingChart(_) => "ring_chart",
            WidgetKind::TimeLineChart(_) => "time_line_chart",
            WidgetKind::ScatterPlot(_) => "scatter_plot",
            WidgetKind::BoxPlot(_) => "box_plot",
        }
    }

    pub fn same_kind(&self, other: &WidgetKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Persisted form of a widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetDescriptor {
    /// Assigned by the panel when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub param: Param,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_by: Option<ColorBy>,
    #[serde(flatten)]
    pub kind: WidgetKind,
}

impl WidgetDescriptor {
    /// Create a new descriptor with default placement
    pub fn new(kind: WidgetKind, param: impl Into<Param>) -> Self {
        Self {
            id: None,
            param: param.into(),
            title: None,
            location: Location::default(),
            color_by: None,
            kind,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn with_color_by(mut self, color_by: ColorBy) -> Self {
        self.color_by = Some(color_by);
        self
    }

    /// Title shown on the widget: the configured one, or the plotted fields
    pub fn display_title(&self) -> String {
        match &self.title {
            Some(title) => title.clone(),
            None => self.param.fields().join(" X "),
        }
    }

    /// Every field the widget reads, including its color field
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = self.param.fields();
        if let Some(color_by) = &self.color_by {
            fields.push(color_by.field.as_str());
        }
        fields
    }

    /// Parse a descriptor; unknown types and missing params are
    /// configuration errors
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| FilterError::configuration(format!("invalid widget descriptor: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FilterError::configuration(format!("invalid widget descriptor: {e}")))
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| FilterError::configuration(e.to_string()))
    }
}

/// Parse a JSON array of descriptors, as saved by a layout
pub fn layout_from_json(json: &str) -> Result<Vec<WidgetDescriptor>> {
    serde_json::from_str(json).map_err(|e| FilterError::configuration(format!("invalid layout: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_are_filled_in() {
        let descriptor = WidgetDescriptor::from_value(json!({"type": "bar_chart", "param": "age"})).unwrap();
        assert_eq!(descriptor.kind, WidgetKind::BarChart(BarOptions::default()));
        assert_eq!(descriptor.location, Location::default());
        assert_eq!(descriptor.display_title(), "age");

        let row = WidgetDescriptor::from_value(json!({"type": "row_chart", "param": ["tags", "amount"], "delimiter": ";"})).unwrap();
        match &row.kind {
            WidgetKind::RowChart(options) => {
                assert_eq!(options.cap, 8);
                assert_eq!(options.delimiter.as_deref(), Some(";"));
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(row.display_title(), "tags X amount");
    }

    #[test]
    fn test_unknown_type_is_a_configuration_error() {
        let err = WidgetDescriptor::from_value(json!({"type": "pie_3d", "param": "age"})).unwrap_err();
        assert!(err.is_configuration());
        let err = WidgetDescriptor::from_value(json!({"type": "bar_chart"})).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_json_round_trip_keeps_type_tag() {
        let descriptor = WidgetDescriptor::new(
            WidgetKind::ScatterPlot(ScatterOptions {
                y_axis: AxisDirection::Down,
                ..Default::default()
            }),
            ["x", "y"],
        )
        .with_id("scatter")
        .with_color_by(ColorBy {
            field: "group".into(),
            scheme: None,
            value_to_color: [("a".to_string(), "red".to_string())].into_iter().collect(),
        });

        let value = descriptor.to_value().unwrap();
        assert_eq!(value["type"], "scatter_plot");
        assert_eq!(value["y_axis"], "down");
        assert_eq!(WidgetDescriptor::from_value(value).unwrap(), descriptor);
        assert_eq!(descriptor.fields(), vec!["x", "y", "group"]);
    }
}
