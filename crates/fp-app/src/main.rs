//! Command-line demo of the filter panel
//!
//! Builds a panel over a CSV file (or generated orders), applies a couple of
//! filters and prints what every widget would draw.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use fp_data::{Column, ColumnType, Key, MissingValues, Record};
use fp_views::{
    layout_from_json, BarOptions, FilterPanel, Interaction, RenderModel, RowOptions, TimeLineOptions,
    WidgetDescriptor, WidgetKind,
};
use tracing::info;

mod loader;
mod sample;

/// Layout used with the generated orders
const ORDERS_LAYOUT: &str = r#"[
    {"id": "revenue", "type": "bar_chart", "param": "revenue", "bin_number": 12,
     "location": {"x": 0, "y": 0, "width": 6, "height": 4}},
    {"id": "region", "type": "row_chart", "param": ["region", "revenue"],
     "location": {"x": 6, "y": 0, "width": 3, "height": 4}},
    {"id": "channels", "type": "row_chart", "param": "channels", "delimiter": ";",
     "location": {"x": 9, "y": 0, "width": 3, "height": 4}},
    {"id": "placed", "type": "time_line_chart", "param": ["placed", "quantity"], "interval": "month",
     "location": {"x": 0, "y": 4, "width": 12, "height": 3}},
    {"id": "price_vs_discount", "type": "scatter_plot", "param": ["price", "discount"],
     "location": {"x": 0, "y": 7, "width": 6, "height": 5}},
    {"id": "price_by_region", "type": "box_plot", "param": ["region", "price"],
     "location": {"x": 6, "y": 7, "width": 6, "height": 5}}
]"#;

/// filterpanel: crossfilter demo over CSV data
#[derive(Parser, Debug)]
#[command(name = "filterpanel")]
#[command(version)]
#[command(about = "Filter a dataset through linked widgets and print what each would draw", long_about = None)]
struct Args {
    /// CSV file with a header row; generated orders are used when absent
    #[arg(long)]
    csv: Option<PathBuf>,

    /// JSON layout of widget descriptors
    #[arg(long)]
    layout: Option<PathBuf>,

    /// Number of generated orders
    #[arg(long, default_value_t = 2_000)]
    rows: usize,
}

/// One widget per column, picked from the column type
fn default_layout(columns: &[Column]) -> Vec<WidgetDescriptor> {
    columns
        .iter()
        .map(|column| {
            let kind = match column.datatype {
                ColumnType::Integer | ColumnType::Double => WidgetKind::BarChart(BarOptions::default()),
                ColumnType::Date => WidgetKind::TimeLineChart(TimeLineOptions::default()),
                ColumnType::Text => WidgetKind::RowChart(RowOptions::default()),
            };
            WidgetDescriptor::new(kind, column.field.as_str()).with_title(column.name.as_str())
        })
        .collect()
}

fn print_widget(panel: &FilterPanel, id: &str) -> Result<()> {
    let title = panel.describe_widget(id)?.display_title();
    match panel.render(id)? {
        RenderModel::Bars { bins, .. } => {
            let bars: Vec<String> = bins.iter().map(|b| format!("{:.1}:{}", b.x0, b.value)).collect();
            println!("  {title}: {}", bars.join(" "));
        }
        RenderModel::Rows { rows } => {
            let rows: Vec<String> = rows
                .iter()
                .map(|r| format!("{}{}={:.1}", if r.selected { "*" } else { "" }, r.label, r.value))
                .collect();
            println!("  {title}: {}", rows.join(", "));
        }
        RenderModel::TimeLine { points } => {
            let points: Vec<String> = points
                .iter()
                .map(|p| format!("{}={}", p.date.format("%Y-%m-%d"), p.value))
                .collect();
            println!("  {title}: {}", points.join(", "));
        }
        RenderModel::Scatter { points } => {
            let visible = points.iter().filter(|p| p.visible).count();
            println!("  {title}: {visible}/{} points visible", points.len());
        }
        RenderModel::Boxes { boxes } => {
            let boxes: Vec<String> = boxes
                .iter()
                .map(|b| format!("{} [{:.1} {:.1} {:.1}]", b.label, b.q1, b.median, b.q3))
                .collect();
            println!("  {title}: {}", boxes.join(", "));
        }
    }
    Ok(())
}

fn print_panel(panel: &FilterPanel, heading: &str) -> Result<()> {
    let result = panel.filtered_result();
    println!("{heading} ({} of {} records live)", result.count, panel.engine().size());
    for id in panel.widget_ids() {
        print_widget(panel, &id)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let records: Vec<Record> = match &args.csv {
        Some(path) => loader::load_csv(path, &MissingValues::default())?,
        None => sample::orders(args.rows),
    };

    let mut panel = FilterPanel::new(records)?;
    let layout = match (&args.layout, &args.csv) {
        (Some(path), _) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
            layout_from_json(&json)?
        }
        (None, Some(_)) => default_layout(&panel.columns()),
        (None, None) => layout_from_json(ORDERS_LAYOUT)?,
    };
    panel.restore_all(layout)?;
    panel.add_listener(|result| info!("Filter changed: {} records live", result.count));
    info!("Panel ready with {} widgets", panel.len());

    print_panel(&panel, "Unfiltered")?;

    // Brush the lower half of the first bar chart and pick the top category
    // of the first row chart
    let layout = panel.describe_all();
    if let Some(bar) = layout.iter().find(|d| matches!(d.kind, WidgetKind::BarChart(_))) {
        if let WidgetKind::BarChart(BarOptions {
            display_min: Some(min),
            display_max: Some(max),
            ..
        }) = bar.kind
        {
            let id = bar.id.clone().unwrap_or_default();
            panel.interact(&id, Interaction::Brush {
                min: Key::number(min),
                max: Key::number(min + (max - min) / 2.0),
            })?;
        }
    }
    if let Some(row) = layout.iter().find(|d| matches!(d.kind, WidgetKind::RowChart(_))) {
        let id = row.id.clone().unwrap_or_default();
        if let RenderModel::Rows { rows } = panel.render(&id)? {
            if let Some(top) = rows.first() {
                panel.interact(&id, Interaction::Toggle(Key::text(top.label.clone())))?;
            }
        }
    }
    print_panel(&panel, "Filtered")?;

    let filters = serde_json::to_string_pretty(&panel.get_active_filters())?;
    println!("Active filters:\n{filters}");

    panel.reset_all();
    info!("Reset to {} records", panel.filtered_result().count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args() {
        Args::command().debug_assert();

        let args = Args::try_parse_from(["filterpanel", "--csv", "orders.csv", "--rows", "10"]).unwrap();
        assert_eq!(args.csv, Some(PathBuf::from("orders.csv")));
        assert_eq!(args.rows, 10);
        assert!(args.layout.is_none());

        assert_eq!(Args::try_parse_from(["filterpanel"]).unwrap().rows, 2_000);
        assert!(Args::try_parse_from(["filterpanel", "--bogus"]).is_err());
        assert!(Args::try_parse_from(["filterpanel", "--rows", "many"]).is_err());
    }
}
