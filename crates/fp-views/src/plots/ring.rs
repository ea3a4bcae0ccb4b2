//! Ring chart: a row chart drawn as a ring, without category splitting

use fp_core::{Crossfilter, FilterError, Result};

use crate::descriptor::{WidgetDescriptor, WidgetKind};

use super::row::{CategoryStyle, RowChart};

/// Label of records with no value in a ring chart
pub const RING_MISSING: &str = "None";

pub fn build(descriptor: WidgetDescriptor, engine: &mut Crossfilter) -> Result<RowChart> {
    let WidgetKind::RingChart(options) = &descriptor.kind else {
        return Err(FilterError::configuration("not a ring chart descriptor"));
    };
    let style = CategoryStyle {
        cap: options.cap,
        delimiter: None,
        missing: RING_MISSING,
    };
    RowChart::with_style(descriptor, engine, style)
}
