use super::{ensure_unique_days, MetricSource};
use crate::config::MetricGroup;
use crate::errors::{AppError, AppResult};
use crate::models::{Observation, WindowSpec};
use std::fs;
use std::path::Path;

/// Rows held in memory, optionally loaded from a JSON array of observations.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rows: Vec<Observation>,
}

impl MemorySource {
    pub fn new(rows: Vec<Observation>) -> Self {
        Self { rows }
    }

    pub fn from_json_file(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Source(format!("failed to read {}: {err}", path.display()))
        })?;
        let rows: Vec<Observation> = serde_json::from_str(&raw)
            .map_err(|err| AppError::Source(format!("invalid observations in {}: {err}", path.display())))?;
        tracing::info!(path = %path.display(), rows = rows.len(), "loaded observations file");
        Ok(Self::new(rows))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl MetricSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, window: &WindowSpec, group: &MetricGroup) -> AppResult<Vec<Observation>> {
        let mut rows: Vec<Observation> = self
            .rows
            .iter()
            .filter(|row| window.admits(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.category.cmp(&b.category)));
        ensure_unique_days(group, &rows)?;
        Ok(rows)
    }
}
