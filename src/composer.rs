//! Turns a group's raw observations into the three chart-ready views.
//!
//! Every category gets one display label, taken from its latest row that
//! carries a description. Rows are ordered by that label, then category, then
//! date, so a category's rows stay contiguous even when its description text
//! changes over time. The undecorated label is used so a flag never reorders
//! facets.

use crate::calendar::calendar_key;
use crate::config::MetricGroup;
use crate::flags::{decorate, evaluate};
use crate::models::{
    BandLayer, GroupViews, HeatmapRecord, LegendEntry, Observation, ViewRecord,
};
use crate::thresholds::derive_band;
use std::cmp::Ordering;
use std::collections::HashMap;

pub fn annotate(observation: &Observation, group: &MetricGroup, marker: &str) -> ViewRecord {
    let band = derive_band(observation.target, &group.multipliers);
    let flag = evaluate(observation.actual, &band);
    let base_label = observation.base_label().to_string();

    ViewRecord {
        category: observation.category.clone(),
        label: decorate(&base_label, flag, marker),
        base_label,
        date: observation.date,
        actual: observation.actual,
        target: observation.target,
        band,
        flag,
    }
}

pub fn compose_group(group: &MetricGroup, observations: &[Observation], marker: &str) -> GroupViews {
    let mut trend: Vec<ViewRecord> = observations
        .iter()
        .filter(|observation| group.contains(&observation.category))
        .map(|observation| annotate(observation, group, marker))
        .collect();

    let labels = category_labels(&trend);
    for record in &mut trend {
        if let Some(label) = labels.get(&record.category) {
            if *label != record.base_label {
                record.base_label = label.clone();
                record.label = decorate(label, record.flag, marker);
            }
        }
    }
    trend.sort_by(compare_records);

    let point_in_time = match trend.iter().map(|record| record.date).max() {
        Some(latest) => trend
            .iter()
            .filter(|record| record.date == latest)
            .cloned()
            .collect(),
        None => Vec::new(),
    };

    let heatmap = trend
        .iter()
        .map(|record| HeatmapRecord {
            calendar: calendar_key(record.date),
            record: record.clone(),
        })
        .collect();

    GroupViews {
        label: group.label.clone(),
        column_roles: group.columns.clone(),
        layers: layers_for(group),
        legend: legend_for(&trend),
        point_in_time,
        trend,
        heatmap,
    }
}

pub fn layers_for(group: &MetricGroup) -> Vec<BandLayer> {
    let mut layers = Vec::with_capacity(5);
    if group.multipliers.above.is_some() {
        layers.push(BandLayer::Above);
    }
    layers.extend([
        BandLayer::Warning,
        BandLayer::Fail,
        BandLayer::Actual,
        BandLayer::Target,
    ]);
    layers
}

// Expects `records` already sorted, so the last row of each category run is
// its latest observation.
fn legend_for(records: &[ViewRecord]) -> Vec<LegendEntry> {
    let mut legend: Vec<LegendEntry> = Vec::new();
    for record in records {
        let entry = LegendEntry {
            category: record.category.clone(),
            base_label: record.base_label.clone(),
            latest_date: record.date,
            latest_actual: record.actual,
            is_failing: record.flag.is_failing,
        };
        match legend.last_mut() {
            Some(last) if last.category == record.category => *last = entry,
            _ => legend.push(entry),
        }
    }
    legend
}

// Latest described row wins; categories never described fall back to their id.
fn category_labels(records: &[ViewRecord]) -> HashMap<String, String> {
    let mut latest: HashMap<&str, (bool, chrono::NaiveDate, &str)> = HashMap::new();
    for record in records {
        let described = record.base_label != record.category;
        let candidate = (described, record.date, record.base_label.as_str());
        latest
            .entry(record.category.as_str())
            .and_modify(|current| {
                if (candidate.0, candidate.1) > (current.0, current.1) {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }
    latest
        .into_iter()
        .map(|(category, (_, _, label))| (category.to_string(), label.to_string()))
        .collect()
}

fn compare_records(left: &ViewRecord, right: &ViewRecord) -> Ordering {
    left.base_label
        .cmp(&right.base_label)
        .then_with(|| left.category.cmp(&right.category))
        .then_with(|| left.date.cmp(&right.date))
}

#[cfg(test)]
mod tests {
    use super::{compose_group, layers_for};
    use crate::config::{ColumnRoles, MetricGroup, Multipliers};
    use crate::models::{BandLayer, Observation};
    use chrono::NaiveDate;

    const MARKER: &str = " 🚩";

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn group(categories: &[&str], multipliers: Multipliers) -> MetricGroup {
        MetricGroup {
            label: "Focus".to_string(),
            table: "metrics_okrs".to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            multipliers,
            columns: ColumnRoles {
                category: "metric_name".to_string(),
                time: "date_day".to_string(),
                actual: "metric_value".to_string(),
                target: "key_result_value".to_string(),
                description: None,
            },
        }
    }

    fn obs(category: &str, date: NaiveDate, actual: f64, target: f64) -> Observation {
        Observation {
            category: category.to_string(),
            date,
            actual,
            target,
            description: None,
        }
    }

    #[test]
    fn two_day_series_is_flagged_on_both_days() {
        let rows = vec![
            obs("X", day(2024, 1, 1), 50.0, 100.0),
            obs("X", day(2024, 1, 2), 55.0, 100.0),
        ];
        let views = compose_group(&group(&["X"], Multipliers::STANDARD), &rows, MARKER);

        assert_eq!(views.trend.len(), 2);
        for record in &views.trend {
            assert_eq!(record.band.fail, 100.0 * 0.6);
            assert_eq!(record.band.warning, 100.0 * 0.9);
            assert_eq!(record.band.above, Some(100.0 * 1.2));
            assert!(record.flag.is_failing);
            assert_eq!(record.label, "X 🚩");
        }

        assert_eq!(views.point_in_time.len(), 1);
        assert_eq!(views.point_in_time[0].date, day(2024, 1, 2));
        assert_eq!(views.point_in_time[0].actual, 55.0);
    }

    #[test]
    fn filters_to_member_categories() {
        let rows = vec![
            obs("A", day(2024, 2, 1), 10.0, 10.0),
            obs("B", day(2024, 2, 1), 10.0, 10.0),
            obs("C", day(2024, 2, 1), 10.0, 10.0),
            obs("A", day(2024, 2, 2), 10.0, 10.0),
            obs("B", day(2024, 2, 2), 1.0, 10.0),
            obs("C", day(2024, 2, 3), 10.0, 10.0),
        ];
        let views = compose_group(&group(&["A", "B"], Multipliers::STANDARD), &rows, MARKER);

        assert!(views.trend.iter().all(|r| r.category == "A" || r.category == "B"));
        assert!(views.heatmap.iter().all(|r| r.record.category != "C"));
        assert_eq!(views.trend.len(), 4);

        // C's later date must not leak into the snapshot date
        let latest: Vec<(&str, NaiveDate)> = views
            .point_in_time
            .iter()
            .map(|r| (r.category.as_str(), r.date))
            .collect();
        assert_eq!(latest, vec![("A", day(2024, 2, 2)), ("B", day(2024, 2, 2))]);
    }

    #[test]
    fn point_in_time_only_includes_categories_present_on_latest_date() {
        let rows = vec![
            obs("A", day(2024, 2, 1), 10.0, 10.0),
            obs("B", day(2024, 2, 3), 10.0, 10.0),
        ];
        let views = compose_group(&group(&["A", "B"], Multipliers::STANDARD), &rows, MARKER);
        assert_eq!(views.point_in_time.len(), 1);
        assert_eq!(views.point_in_time[0].category, "B");
    }

    #[test]
    fn empty_input_yields_empty_views() {
        let views = compose_group(&group(&["A"], Multipliers::STANDARD), &[], MARKER);
        assert!(views.is_empty());
        assert!(views.legend.is_empty());
        assert_eq!(views.label, "Focus");

        let unrelated = vec![obs("Z", day(2024, 1, 1), 1.0, 1.0)];
        let views = compose_group(&group(&["A"], Multipliers::STANDARD), &unrelated, MARKER);
        assert!(views.is_empty());
    }

    #[test]
    fn rows_sorted_by_label_then_date() {
        let mut reading = obs("reading_okr", day(2024, 1, 2), 1.0, 1.0);
        reading.description = Some("2.1 Reading".to_string());
        let mut reading_early = reading.clone();
        reading_early.date = day(2024, 1, 1);
        let mut deep = obs("deep_work_okr", day(2024, 1, 1), 1.0, 1.0);
        deep.description = Some("1.1 Deep work".to_string());

        let rows = vec![reading, deep, reading_early];
        let views = compose_group(
            &group(&["reading_okr", "deep_work_okr"], Multipliers::STANDARD),
            &rows,
            MARKER,
        );

        let order: Vec<(&str, NaiveDate)> = views
            .trend
            .iter()
            .map(|r| (r.base_label.as_str(), r.date))
            .collect();
        assert_eq!(
            order,
            vec![
                ("1.1 Deep work", day(2024, 1, 1)),
                ("2.1 Reading", day(2024, 1, 1)),
                ("2.1 Reading", day(2024, 1, 2)),
            ]
        );
    }

    #[test]
    fn changing_description_keeps_category_rows_together() {
        let mut old_text = obs("deep_work_okr", day(2024, 1, 1), 1.0, 100.0);
        old_text.description = Some("zeta old text".to_string());
        let missing_text = obs("deep_work_okr", day(2024, 1, 2), 100.0, 100.0);
        let mut meditation = obs("meditation_okr", day(2024, 1, 2), 1.0, 1.0);
        meditation.description = Some("m".to_string());

        let rows = vec![old_text, missing_text, meditation];
        let views = compose_group(
            &group(&["deep_work_okr", "meditation_okr"], Multipliers::STANDARD),
            &rows,
            MARKER,
        );

        let order: Vec<(&str, NaiveDate)> = views
            .trend
            .iter()
            .map(|r| (r.category.as_str(), r.date))
            .collect();
        assert_eq!(
            order,
            vec![
                ("meditation_okr", day(2024, 1, 2)),
                ("deep_work_okr", day(2024, 1, 1)),
                ("deep_work_okr", day(2024, 1, 2)),
            ]
        );
        assert!(views
            .trend
            .iter()
            .filter(|r| r.category == "deep_work_okr")
            .all(|r| r.base_label == "zeta old text"));
        assert_eq!(views.trend[1].label, "zeta old text 🚩");
        assert_eq!(views.trend[2].label, "zeta old text");

        assert_eq!(views.legend.len(), 2);
        assert_eq!(views.legend[1].category, "deep_work_okr");
        assert_eq!(views.legend[1].latest_date, day(2024, 1, 2));
        assert!(!views.legend[1].is_failing);
    }

    #[test]
    fn newer_description_renames_the_category() {
        let mut first = obs("A", day(2024, 1, 1), 1.0, 1.0);
        first.description = Some("b old".to_string());
        let mut second = obs("A", day(2024, 1, 2), 1.0, 1.0);
        second.description = Some("a new".to_string());

        let views = compose_group(&group(&["A"], Multipliers::STANDARD), &[second, first], MARKER);
        assert!(views.trend.iter().all(|r| r.base_label == "a new"));
        assert_eq!(views.trend[0].date, day(2024, 1, 1));
        assert_eq!(views.legend.len(), 1);
    }

    #[test]
    fn heatmap_rows_carry_calendar_keys() {
        let rows = vec![
            obs("A", day(2021, 1, 4), 1.0, 1.0),
            obs("A", day(2021, 1, 10), 1.0, 1.0),
        ];
        let views = compose_group(&group(&["A"], Multipliers::STANDARD), &rows, MARKER);
        let days: Vec<u8> = views.heatmap.iter().map(|r| r.calendar.day_of_week).collect();
        assert_eq!(days, vec![0, 6]);
        assert!(views.heatmap.iter().all(|r| r.calendar.year_week == "20211"));
    }

    #[test]
    fn legend_reports_latest_flag_per_category() {
        let rows = vec![
            obs("A", day(2024, 1, 1), 1.0, 100.0),
            obs("A", day(2024, 1, 2), 100.0, 100.0),
            obs("B", day(2024, 1, 2), 1.0, 100.0),
        ];
        let views = compose_group(&group(&["A", "B"], Multipliers::STANDARD), &rows, MARKER);
        assert_eq!(views.legend.len(), 2);
        assert_eq!(views.legend[0].category, "A");
        assert!(!views.legend[0].is_failing);
        assert_eq!(views.legend[0].latest_date, day(2024, 1, 2));
        assert!(views.legend[1].is_failing);
    }

    #[test]
    fn composing_twice_is_byte_equal() {
        let rows = vec![
            obs("B", day(2024, 1, 2), 3.0, 10.0),
            obs("A", day(2024, 1, 1), 7.0, 10.0),
            obs("A", day(2024, 1, 2), 9.5, 10.0),
        ];
        let g = group(&["A", "B"], Multipliers::STANDARD);
        let first = serde_json::to_vec(&compose_group(&g, &rows, MARKER)).expect("serialize");
        let second = serde_json::to_vec(&compose_group(&g, &rows, MARKER)).expect("serialize");
        assert_eq!(first, second);
    }

    #[test]
    fn simple_groups_skip_above_layer() {
        assert_eq!(
            layers_for(&group(&["A"], Multipliers::SIMPLE)),
            vec![BandLayer::Warning, BandLayer::Fail, BandLayer::Actual, BandLayer::Target]
        );
        assert_eq!(layers_for(&group(&["A"], Multipliers::STANDARD))[0], BandLayer::Above);
    }
}
