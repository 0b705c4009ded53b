use crate::errors::{AppError, AppResult};
use crate::models::DashboardViews;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Consumes the composed views. Implementations draw or publish them; the
/// pipeline does not read anything back.
pub trait RenderSurface: Send + Sync {
    fn render(&self, views: &DashboardViews) -> AppResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonTarget {
    Stdout,
    File(PathBuf),
}

/// Writes the dashboard as one JSON document for a charting front-end.
#[derive(Debug, Clone)]
pub struct JsonSurface {
    target: JsonTarget,
    pretty: bool,
}

impl JsonSurface {
    pub fn new(target: JsonTarget) -> Self {
        Self {
            target,
            pretty: true,
        }
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    fn encode(&self, views: &DashboardViews) -> AppResult<Vec<u8>> {
        let mut bytes = if self.pretty {
            serde_json::to_vec_pretty(views)?
        } else {
            serde_json::to_vec(views)?
        };
        bytes.push(b'\n');
        Ok(bytes)
    }
}

impl RenderSurface for JsonSurface {
    fn render(&self, views: &DashboardViews) -> AppResult<()> {
        let bytes = self.encode(views)?;
        match &self.target {
            JsonTarget::Stdout => {
                let stdout = std::io::stdout();
                let mut handle = stdout.lock();
                handle
                    .write_all(&bytes)
                    .and_then(|_| handle.flush())
                    .map_err(|err| AppError::Render(format!("failed to write to stdout: {err}")))
            }
            JsonTarget::File(path) => {
                if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                // Stage next to the target so the rename stays on one filesystem.
                let staging = path.with_extension("json.partial");
                fs::write(&staging, &bytes).map_err(|err| {
                    AppError::Render(format!("failed to write {}: {err}", staging.display()))
                })?;
                fs::rename(&staging, path).map_err(|err| {
                    let _ = fs::remove_file(&staging);
                    AppError::Render(format!("failed to publish {}: {err}", path.display()))
                })?;
                tracing::info!(path = %path.display(), bytes = bytes.len(), "dashboard written");
                Ok(())
            }
        }
    }
}
