//! Time line chart: a date field bucketed by interval, brushed by date range

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use fp_core::{Crossfilter, DimensionId, FilterError, Result};
use fp_data::{Key, Record};

use crate::descriptor::{TimeInterval, WidgetDescriptor, WidgetKind};
use crate::render::{RenderModel, TimePoint};
use crate::widget::{new_view, FilterSpec, Interaction, SharedView, WidgetAdapter};

use super::{range_filters, range_predicate, replay_range, Measure};

/// Start of the interval holding `date`. Weeks start on Sunday.
pub fn truncate(date: DateTime<Utc>, interval: TimeInterval) -> DateTime<Utc> {
    let day = date.date_naive();
    let start = match interval {
        TimeInterval::Year => NaiveDate::from_ymd_opt(day.year(), 1, 1),
        TimeInterval::Month => NaiveDate::from_ymd_opt(day.year(), day.month(), 1),
        TimeInterval::Week => Some(day - Duration::days(day.weekday().num_days_from_sunday() as i64)),
        TimeInterval::Day => Some(day),
    };
    start
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| Utc.from_utc_datetime(&d))
        .unwrap_or(date)
}

pub struct TimeLineChart {
    descriptor: WidgetDescriptor,
    dimension: DimensionId,
    measure: Measure,
    view: SharedView,
}

impl TimeLineChart {
    pub fn build(descriptor: WidgetDescriptor, engine: &mut Crossfilter) -> Result<Self> {
        let WidgetKind::TimeLineChart(options) = &descriptor.kind else {
            return Err(FilterError::configuration("not a time line descriptor"));
        };
        let interval = options.interval;
        let field = descriptor
            .param
            .first()
            .ok_or_else(|| FilterError::configuration("time line needs a date field"))?
            .to_string();

        let dimension = engine.dimension(move |r: &Record| r.get(&field).as_date().map_or(Key::Missing, Key::date));
        let bucket = move |k: &Key| k.as_date().map_or(Key::Missing, |d| Key::date(truncate(d, interval)));
        let measure = Measure::build(engine, dimension, bucket, descriptor.param.get(1))?;

        Ok(Self {
            descriptor,
            dimension,
            measure,
            view: new_view(),
        })
    }

    fn field(&self) -> &str {
        self.descriptor.param.first().unwrap_or_default()
    }
}

impl WidgetAdapter for TimeLineChart {
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
        let points = self
            .measure
            .values(engine)?
            .into_iter()
            .filter_map(|(key, value)| Some(TimePoint { date: key.as_date()?, value }))
            .collect();
        Ok(RenderModel::TimeLine { points })
    }

    fn view(&self) -> SharedView {
        self.view.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 30, 0).unwrap()
    }

    #[test]
    fn test_truncate_intervals() {
        // 2024-03-14 is a Thursday
        let date = at(2024, 3, 14, 15);
        assert_eq!(truncate(date, TimeInterval::Year), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(truncate(date, TimeInterval::Month), Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(truncate(date, TimeInterval::Week), Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(truncate(date, TimeInterval::Day), Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap());
    }
}
