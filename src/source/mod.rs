pub mod cache;
pub mod memory;
pub mod sqlite;

pub use cache::CachedSource;
pub use memory::MemorySource;
pub use sqlite::SqliteSource;

use crate::config::MetricGroup;
use crate::errors::{AppError, AppResult};
use crate::models::{Observation, WindowSpec};
use chrono::NaiveDate;
use std::collections::HashSet;

/// Supplies raw observation rows for one metric group over a window.
pub trait MetricSource: Send + Sync {
    fn name(&self) -> &str;
    fn fetch(&self, window: &WindowSpec, group: &MetricGroup) -> AppResult<Vec<Observation>>;
}

/// The window a refresh asks for: the configured lookback ending at `as_of`,
/// restricted to the group's member categories.
pub fn window_for(
    group: &MetricGroup,
    as_of: NaiveDate,
    lookback_days: u32,
) -> AppResult<WindowSpec> {
    Ok(WindowSpec::lookback(as_of, lookback_days)?
        .with_categories(group.categories.iter().cloned()))
}

pub fn ensure_unique_days(group: &MetricGroup, observations: &[Observation]) -> AppResult<()> {
    let mut seen = HashSet::with_capacity(observations.len());
    for observation in observations {
        if !seen.insert((observation.category.as_str(), observation.date)) {
            return Err(AppError::Source(format!(
                "group '{}' has duplicate rows for category '{}' on {}",
                group.label, observation.category, observation.date
            )));
        }
    }
    Ok(())
}
