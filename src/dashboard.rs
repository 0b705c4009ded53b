use crate::composer::compose_group;
use crate::config::{DashboardConfig, MetricGroup};
use crate::errors::{AppError, AppResult};
use crate::models::{DashboardViews, GroupViews, Observation};
use crate::render::RenderSurface;
use crate::source::{window_for, MetricSource};
use chrono::{NaiveDate, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use uuid::Uuid;

/// Builds the views for every group from already-fetched rows.
pub fn compose_dashboard(
    config: &DashboardConfig,
    as_of: NaiveDate,
    fetched: &[(&MetricGroup, Vec<Observation>)],
) -> DashboardViews {
    let groups: Vec<GroupViews> = fetched
        .iter()
        .map(|(group, rows)| compose_group(group, rows, &config.flag_marker))
        .collect();

    DashboardViews {
        snapshot_id: Uuid::new_v4().to_string(),
        generated_at: Utc::now(),
        as_of,
        groups,
    }
}

/// Owns one refresh cycle: fetch every group, compose, render, then publish
/// the new state. A failure anywhere leaves the previous state in place.
pub struct Dashboard {
    config: Arc<DashboardConfig>,
    source: Arc<dyn MetricSource>,
    surface: Arc<dyn RenderSurface>,
    current: RwLock<Option<Arc<DashboardViews>>>,
}

impl Dashboard {
    pub fn new(
        config: Arc<DashboardConfig>,
        source: Arc<dyn MetricSource>,
        surface: Arc<dyn RenderSurface>,
    ) -> Self {
        Self {
            config,
            source,
            surface,
            current: RwLock::new(None),
        }
    }

    /// The last successfully rendered state, if any.
    pub fn current(&self) -> AppResult<Option<Arc<DashboardViews>>> {
        let guard = self
            .current
            .read()
            .map_err(|_| AppError::Internal("dashboard state lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    /// Fetches every group and composes the views without rendering them.
    /// Any single source failure fails the whole composition.
    pub fn compose(&self, as_of: NaiveDate) -> AppResult<DashboardViews> {
        let lookback = self.config.source.lookback_days;
        let mut fetched = Vec::with_capacity(self.config.groups.len());
        for group in &self.config.groups {
            let window = window_for(group, as_of, lookback)?;
            let rows = self.source.fetch(&window, group).map_err(|err| {
                tracing::error!(
                    group = %group.label,
                    source = self.source.name(),
                    error = %err,
                    "metric source fetch failed"
                );
                err
            })?;
            tracing::debug!(group = %group.label, rows = rows.len(), "fetched metric rows");
            fetched.push((group, rows));
        }

        Ok(compose_dashboard(&self.config, as_of, &fetched))
    }

    pub fn refresh(&self, as_of: NaiveDate) -> AppResult<Arc<DashboardViews>> {
        let views = Arc::new(self.compose(as_of)?);
        self.surface.render(&views)?;

        let mut guard = self
            .current
            .write()
            .map_err(|_| AppError::Internal("dashboard state lock poisoned".to_string()))?;
        *guard = Some(Arc::clone(&views));

        let flagged = views
            .groups
            .iter()
            .flat_map(|group| group.legend.iter())
            .filter(|entry| entry.is_failing)
            .count();
        tracing::info!(
            snapshot_id = %views.snapshot_id,
            as_of = %as_of,
            groups = views.groups.len(),
            rows = views.row_count(),
            flagged,
            "dashboard refreshed"
        );
        Ok(views)
    }
}

/// Shortest period `watch` will tick at.
pub const MIN_WATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Refreshes on a fixed interval until the process exits. Failed refreshes are
/// logged and the previous state stays published.
pub async fn watch(dashboard: Arc<Dashboard>, every: Duration) {
    let every = every.max(MIN_WATCH_INTERVAL);
    tracing::info!(interval_secs = every.as_secs(), "watching metric sources");
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let dashboard = Arc::clone(&dashboard);
        let outcome = tokio::task::spawn_blocking(move || {
            let today = chrono::Local::now().date_naive();
            dashboard.refresh(today)
        })
        .await;

        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(error)) => {
                tracing::warn!(error = %error, "dashboard refresh failed; keeping previous state");
            }
            Err(error) => {
                tracing::warn!(error = %error, "dashboard refresh task panicked");
            }
        }
    }
}
