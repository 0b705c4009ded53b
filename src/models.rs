use crate::config::ColumnRoles;
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ─── Source Rows ────────────────────────────────────────────────────────────

/// One raw measurement as yielded by a metric source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub category: String,
    pub date: NaiveDate,
    pub actual: f64,
    pub target: f64,
    #[serde(default)]
    pub description: Option<String>,
}

impl Observation {
    /// Label shown for the category before any flag marker is applied.
    pub fn base_label(&self) -> &str {
        self.description
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(&self.category)
    }
}

/// Date range and optional category filter for one source fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSpec {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub categories: Option<Vec<String>>,
}

impl WindowSpec {
    /// Window of `days` days ending on (and including) `as_of`. Fails when the
    /// start would fall outside the representable date range.
    pub fn lookback(as_of: NaiveDate, days: u32) -> AppResult<Self> {
        let span = i64::from(days.max(1)) - 1;
        let start = as_of.checked_sub_signed(Duration::days(span)).ok_or_else(|| {
            AppError::Config(format!("lookback of {days} days before {as_of} is out of range"))
        })?;
        Ok(Self {
            start,
            end: Some(as_of),
            categories: None,
        })
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = categories.into_iter().map(Into::into).collect();
        list.sort();
        list.dedup();
        self.categories = Some(list);
        self
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start && self.end.map_or(true, |end| date <= end)
    }

    pub fn admits(&self, observation: &Observation) -> bool {
        self.contains_date(observation.date)
            && self
                .categories
                .as_ref()
                .map_or(true, |list| list.iter().any(|c| c == &observation.category))
    }
}

// ─── Derived Annotations ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdBand {
    pub fail: f64,
    pub warning: f64,
    pub above: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub is_failing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarKey {
    /// ISO year immediately followed by ISO week, e.g. `20211`. Not unique
    /// across years; group on `iso_year`/`iso_week` when that matters.
    pub year_week: String,
    pub iso_year: i32,
    pub iso_week: u32,
    /// Monday = 0 through Sunday = 6.
    pub day_of_week: u8,
}

// ─── Views ──────────────────────────────────────────────────────────────────

/// Annotated observation shared by the point-in-time and trend views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRecord {
    pub category: String,
    pub base_label: String,
    pub label: String,
    pub date: NaiveDate,
    pub actual: f64,
    pub target: f64,
    pub band: ThresholdBand,
    pub flag: Flag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapRecord {
    #[serde(flatten)]
    pub record: ViewRecord,
    pub calendar: CalendarKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegendEntry {
    pub category: String,
    pub base_label: String,
    pub latest_date: NaiveDate,
    pub latest_actual: f64,
    pub is_failing: bool,
}

/// Draw order of the layers in the bullet and trend panels, back to front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BandLayer {
    Above,
    Warning,
    Fail,
    Actual,
    Target,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupViews {
    pub label: String,
    /// Source columns the rows were read from. Provenance only; the records
    /// themselves always use `actual`, `target` and `band`.
    pub column_roles: ColumnRoles,
    pub layers: Vec<BandLayer>,
    pub legend: Vec<LegendEntry>,
    pub point_in_time: Vec<ViewRecord>,
    pub trend: Vec<ViewRecord>,
    pub heatmap: Vec<HeatmapRecord>,
}

impl GroupViews {
    pub fn is_empty(&self) -> bool {
        self.point_in_time.is_empty() && self.trend.is_empty() && self.heatmap.is_empty()
    }
}

/// The full document handed to a rendering surface after one refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardViews {
    pub snapshot_id: String,
    pub generated_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub groups: Vec<GroupViews>,
}

impl DashboardViews {
    pub fn group(&self, label: &str) -> Option<&GroupViews> {
        self.groups.iter().find(|group| group.label == label)
    }

    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|group| group.trend.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::{Observation, WindowSpec};
    use crate::errors::AppError;
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn base_label_falls_back_to_category() {
        let mut obs = Observation {
            category: "reading_okr".to_string(),
            date: day(2024, 3, 1),
            actual: 10.0,
            target: 20.0,
            description: None,
        };
        assert_eq!(obs.base_label(), "reading_okr");

        obs.description = Some("   ".to_string());
        assert_eq!(obs.base_label(), "reading_okr");

        obs.description = Some("2.1 - Read 20 pages".to_string());
        assert_eq!(obs.base_label(), "2.1 - Read 20 pages");
    }

    #[test]
    fn lookback_window_is_inclusive() {
        let window = WindowSpec::lookback(day(2024, 1, 31), 31).expect("window");
        assert_eq!(window.start, day(2024, 1, 1));
        assert!(window.contains_date(day(2024, 1, 1)));
        assert!(window.contains_date(day(2024, 1, 31)));
        assert!(!window.contains_date(day(2024, 2, 1)));
        assert!(!window.contains_date(day(2023, 12, 31)));
    }

    #[test]
    fn category_filter_is_sorted_and_deduplicated() {
        let window = WindowSpec::lookback(day(2024, 1, 31), 7)
            .expect("window")
            .with_categories(["b", "a", "b"]);
        assert_eq!(
            window.categories,
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn lookback_past_the_calendar_is_an_error() {
        let err = WindowSpec::lookback(day(2024, 1, 2), 4_000_000_000).expect_err("out of range");
        assert!(matches!(err, AppError::Config(_)));
    }
}
