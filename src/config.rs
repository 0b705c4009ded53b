use crate::errors::{AppError, AppResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

const SQL_IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

static SQL_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(SQL_IDENTIFIER_PATTERN).expect("valid identifier regex"));

pub const DEFAULT_FLAG_MARKER: &str = " 🚩";
pub const DEFAULT_LOOKBACK_DAYS: u32 = 90;
/// One hundred years of daily rows.
pub const MAX_LOOKBACK_DAYS: u32 = 36_525;
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Multipliers applied to a target to obtain the band boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Multipliers {
    pub fail: f64,
    pub warning: f64,
    #[serde(default)]
    pub above: Option<f64>,
}

impl Multipliers {
    pub const STANDARD: Self = Self {
        fail: 0.6,
        warning: 0.9,
        above: Some(1.2),
    };

    /// Preset for groups that only distinguish fail and warning.
    pub const SIMPLE: Self = Self {
        fail: 0.6,
        warning: 0.8,
        above: None,
    };

    fn validate(&self, group: &str) -> AppResult<()> {
        let values = [Some(self.fail), Some(self.warning), self.above];
        for value in values.into_iter().flatten() {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::Config(format!(
                    "group '{group}' has an invalid multiplier {value}"
                )));
            }
        }

        // fail <= warning <= target (1.0) <= above
        let ordered = self.fail <= self.warning
            && self.warning <= 1.0
            && self.above.map_or(true, |above| above >= 1.0);
        if !ordered {
            return Err(AppError::Config(format!(
                "group '{group}' multipliers must satisfy fail <= warning <= 1 <= above (got {}, {}, {:?})",
                self.fail, self.warning, self.above
            )));
        }
        Ok(())
    }
}

/// Source column names that play each role for a metric group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRoles {
    pub category: String,
    pub time: String,
    pub actual: String,
    pub target: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ColumnRoles {
    pub fn columns(&self) -> Vec<&str> {
        let mut columns = vec![
            self.category.as_str(),
            self.time.as_str(),
            self.actual.as_str(),
            self.target.as_str(),
        ];
        if let Some(description) = self.description.as_deref() {
            columns.push(description);
        }
        columns
    }

    fn validate(&self, group: &str) -> AppResult<()> {
        for column in self.columns() {
            ensure_identifier(group, column)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricGroup {
    pub label: String,
    pub table: String,
    pub categories: BTreeSet<String>,
    pub multipliers: Multipliers,
    pub columns: ColumnRoles,
}

impl MetricGroup {
    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains(category)
    }

    fn validate(&self) -> AppResult<()> {
        if self.label.trim().is_empty() {
            return Err(AppError::Config("metric group label must not be empty".to_string()));
        }
        if self.categories.is_empty() {
            return Err(AppError::Config(format!(
                "group '{}' must list at least one category",
                self.label
            )));
        }
        if self.categories.iter().any(|category| category.trim().is_empty()) {
            return Err(AppError::Config(format!(
                "group '{}' contains an empty category",
                self.label
            )));
        }
        ensure_identifier(&self.label, &self.table)?;
        self.multipliers.validate(&self.label)?;
        self.columns.validate(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSettings {
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            database: None,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
        }
    }
}

/// Immutable dashboard configuration, built once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    #[serde(default)]
    pub source: SourceSettings,
    #[serde(default = "default_flag_marker")]
    pub flag_marker: String,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    pub groups: Vec<MetricGroup>,
}

impl DashboardConfig {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> AppResult<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> AppResult<String> {
        serde_yaml::to_string(self).map_err(|err| AppError::Internal(err.to_string()))
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.groups.is_empty() {
            return Err(AppError::Config("at least one metric group is required".to_string()));
        }
        if self.source.lookback_days == 0 || self.source.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(AppError::Config(format!(
                "lookbackDays must be between 1 and {MAX_LOOKBACK_DAYS} (got {})",
                self.source.lookback_days
            )));
        }

        let mut labels = HashSet::new();
        for group in &self.groups {
            group.validate()?;
            if !labels.insert(group.label.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate metric group label '{}'",
                    group.label
                )));
            }
        }
        Ok(())
    }

    pub fn group(&self, label: &str) -> Option<&MetricGroup> {
        self.groups.iter().find(|group| group.label == label)
    }

    /// The stock dashboard: focus and learning OKRs plus daily health scores.
    pub fn builtin() -> Self {
        let okr_columns = ColumnRoles {
            category: "metric_name".to_string(),
            time: "date_day".to_string(),
            actual: "metric_value".to_string(),
            target: "key_result_value".to_string(),
            description: Some("okr_display_text".to_string()),
        };

        Self {
            source: SourceSettings::default(),
            flag_marker: default_flag_marker(),
            log_dir: None,
            groups: vec![
                MetricGroup {
                    label: "Focus".to_string(),
                    table: "metrics_okrs".to_string(),
                    categories: categories(&["deep_work_okr", "meditation_okr"]),
                    multipliers: Multipliers::STANDARD,
                    columns: okr_columns.clone(),
                },
                MetricGroup {
                    label: "Learning".to_string(),
                    table: "metrics_okrs".to_string(),
                    categories: categories(&["reading_okr", "writing_okr"]),
                    multipliers: Multipliers::STANDARD,
                    columns: okr_columns,
                },
                MetricGroup {
                    label: "Health & Wellness".to_string(),
                    table: "metrics_health".to_string(),
                    categories: categories(&["sleep_score", "readiness_score", "activity_score"]),
                    multipliers: Multipliers::SIMPLE,
                    columns: ColumnRoles {
                        category: "score_type".to_string(),
                        time: "date_day".to_string(),
                        actual: "score_value".to_string(),
                        target: "target_value".to_string(),
                        description: None,
                    },
                },
            ],
        }
    }
}

fn categories(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn ensure_identifier(group: &str, identifier: &str) -> AppResult<()> {
    if SQL_IDENTIFIER.is_match(identifier) {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "group '{group}' references invalid SQL identifier '{identifier}'"
        )))
    }
}

fn default_flag_marker() -> String {
    DEFAULT_FLAG_MARKER.to_string()
}

fn default_lookback_days() -> u32 {
    DEFAULT_LOOKBACK_DAYS
}

fn default_cache_ttl_seconds() -> u64 {
    DEFAULT_CACHE_TTL_SECONDS
}
