//! Render models handed to an external renderer

use chrono::{DateTime, Utc};
use fp_core::Stack;
use fp_data::RecordId;
use serde::Serialize;

/// One histogram bin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bin {
    pub x0: f64,
    pub width: f64,
    pub value: f64,
    /// Per-category split when the chart is colored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Stack>,
}

/// One category row of a row or ring chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub label: String,
    pub value: f64,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimePoint {
    pub date: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub id: RecordId,
    pub x: f64,
    pub y: f64,
    pub visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Five-number summary of one box
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxSummary {
    pub label: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl BoxSummary {
    /// Summarize sorted values; `None` for an empty box
    pub fn from_sorted(label: impl Into<String>, sorted: &[f64]) -> Option<Self> {
        let (first, last) = (sorted.first()?, sorted.last()?);
        let (q1, median, q3) = quartiles(sorted);
        Some(Self {
            label: label.into(),
            count: sorted.len(),
            min: *first,
            q1,
            median,
            q3,
            max: *last,
        })
    }
}

/// Quartiles of sorted values by linear interpolation
pub fn quartiles(sorted: &[f64]) -> (f64, f64, f64) {
    if sorted.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let last = (sorted.len() - 1) as f64;
    (
        interpolate(sorted, last * 0.25),
        interpolate(sorted, last * 0.5),
        interpolate(sorted, last * 0.75),
    )
}

fn interpolate(sorted: &[f64], idx: f64) -> f64 {
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    if lower == upper || upper >= sorted.len() {
        sorted[lower]
    } else {
        let fraction = idx - lower as f64;
        sorted[lower] * (1.0 - fraction) + sorted[upper] * fraction
    }
}

/// What a widget draws
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderModel {
    Bars {
        bins: Vec<Bin>,
        display_min: f64,
        display_max: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_y: Option<f64>,
        /// Categories of a colored chart, "Other" last
        categories: Vec<String>,
    },
    Rows {
        rows: Vec<Row>,
    },
    TimeLine {
        points: Vec<TimePoint>,
    },
    Scatter {
        points: Vec<ScatterPoint>,
    },
    Boxes {
        boxes: Vec<BoxSummary>,
    },
}
