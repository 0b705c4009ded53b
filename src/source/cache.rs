use super::MetricSource;
use crate::config::MetricGroup;
use crate::errors::{AppError, AppResult};
use crate::models::{Observation, WindowSpec};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct CacheEntry {
    fetched_at: Instant,
    rows: Arc<Vec<Observation>>,
}

/// Memoizes fetches per (group, window) for `ttl`, so repeated refreshes of
/// the same window do not re-issue the query. Failures are never cached.
pub struct CachedSource {
    inner: Box<dyn MetricSource>,
    ttl: Duration,
    entries: Mutex<HashMap<(String, WindowSpec), CacheEntry>>,
}

impl CachedSource {
    pub fn new(inner: Box<dyn MetricSource>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn invalidate(&self) -> AppResult<()> {
        self.lock_entries()?.clear();
        Ok(())
    }

    pub fn cached_windows(&self) -> AppResult<usize> {
        Ok(self.lock_entries()?.len())
    }

    fn lock_entries(
        &self,
    ) -> AppResult<std::sync::MutexGuard<'_, HashMap<(String, WindowSpec), CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("source cache mutex poisoned".to_string()))
    }
}

impl MetricSource for CachedSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fetch(&self, window: &WindowSpec, group: &MetricGroup) -> AppResult<Vec<Observation>> {
        let key = (group.label.clone(), window.clone());
        {
            let entries = self.lock_entries()?;
            if let Some(entry) = entries.get(&key) {
                if entry.fetched_at.elapsed() < self.ttl {
                    tracing::debug!(group = %group.label, "source cache hit");
                    return Ok(entry.rows.as_ref().clone());
                }
            }
        }

        let rows = Arc::new(self.inner.fetch(window, group)?);
        let mut entries = self.lock_entries()?;
        entries.retain(|_, entry| entry.fetched_at.elapsed() < self.ttl);
        entries.insert(
            key,
            CacheEntry {
                fetched_at: Instant::now(),
                rows: Arc::clone(&rows),
            },
        );
        Ok(rows.as_ref().clone())
    }
}
