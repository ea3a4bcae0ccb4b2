//! Widgets and the filter panel that coordinates them

pub mod debounce;
pub mod descriptor;
pub mod panel;
pub mod plots;
pub mod render;
pub mod widget;

pub use debounce::{Debouncer, DEFAULT_WINDOW};
pub use descriptor::{
    layout_from_json, AxisDirection, BarOptions, BoxOptions, ColorBy, Location, Param, RingOptions, RowOptions,
    ScatterOptions, TimeInterval, TimeLineOptions, WidgetDescriptor, WidgetKind,
};
pub use panel::{FilterPanel, Propagation};
pub use render::{Bin, BoxSummary, RenderModel, Row, ScatterPoint, TimePoint};
pub use widget::{FilterSpec, Interaction, Operand, Reaction, SharedView, ViewState, WidgetAdapter};
