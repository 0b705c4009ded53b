use super::{ensure_unique_days, MetricSource};
use crate::config::MetricGroup;
use crate::errors::{AppError, AppResult};
use crate::models::{Observation, WindowSpec};
use chrono::NaiveDate;
use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Reads metric rows from a SQLite database. Each group names its own table
/// and columns, so one database can hold heterogeneous metric schemas.
#[derive(Debug)]
pub struct SqliteSource {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteSource {
    /// Opens `path` read-only and checks that every group's table and
    /// columns exist.
    pub fn open(path: &Path, groups: &[MetricGroup]) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::NotFound(format!(
                "metric database not found: {}",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|err| AppError::Source(format!("failed to open {}: {err}", path.display())))?;

        for group in groups {
            validate_group_schema(&conn, group)?;
        }

        tracing::info!(path = %path.display(), groups = groups.len(), "metric database opened");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

impl MetricSource for SqliteSource {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn fetch(&self, window: &WindowSpec, group: &MetricGroup) -> AppResult<Vec<Observation>> {
        let (sql, params) = build_query(window, group);
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("metric database mutex poisoned".to_string()))?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut observations = Vec::new();
        let mut skipped = 0usize;
        while let Some(row) = rows.next()? {
            let category: String = row.get(0)?;
            let raw_date: Option<String> = row.get(1)?;
            let actual: Option<f64> = row.get(2)?;
            let target: Option<f64> = row.get(3)?;
            let description: Option<String> = row.get(4)?;

            let Some(actual) = actual else {
                skipped += 1;
                continue;
            };
            let date = parse_day(raw_date.as_deref(), group)?;

            observations.push(Observation {
                category,
                date,
                actual,
                target: target.unwrap_or(0.0),
                description,
            });
        }

        if skipped > 0 {
            tracing::debug!(group = %group.label, skipped, "skipped rows without an actual value");
        }
        ensure_unique_days(group, &observations)?;
        Ok(observations)
    }
}

fn validate_group_schema(conn: &Connection, group: &MetricGroup) -> AppResult<()> {
    if !table_exists(conn, &group.table)? {
        return Err(AppError::Config(format!(
            "group '{}' reads missing table '{}'",
            group.label, group.table
        )));
    }
    for column in group.columns.columns() {
        if !column_exists(conn, &group.table, column)? {
            return Err(AppError::Config(format!(
                "group '{}' references missing column '{}.{}'",
                group.label, group.table, column
            )));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> AppResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            [table],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let pragma = format!("PRAGMA table_info({})", quoted(table));
    let mut stmt = conn.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

// Identifiers were checked against the SQL identifier pattern when the
// configuration loaded, so quoting them only guards against keywords such as
// `order`. Values are bound as parameters.
fn quoted(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn build_query(window: &WindowSpec, group: &MetricGroup) -> (String, Vec<String>) {
    let columns = &group.columns;
    let category = quoted(&columns.category);
    let time = quoted(&columns.time);
    let description = columns
        .description
        .as_deref()
        .map(|column| format!("CAST({} AS TEXT)", quoted(column)))
        .unwrap_or_else(|| "NULL".to_string());

    let mut sql = format!(
        "SELECT CAST({category} AS TEXT), date({time}), {actual}, {target}, {description}
         FROM {table}
         WHERE date({time}) >= ?1",
        category = category,
        time = time,
        actual = quoted(&columns.actual),
        target = quoted(&columns.target),
        description = description,
        table = quoted(&group.table),
    );
    let mut params = vec![window.start.format("%Y-%m-%d").to_string()];

    if let Some(end) = window.end {
        params.push(end.format("%Y-%m-%d").to_string());
        sql.push_str(&format!(" AND date({time}) <= ?{}", params.len()));
    }

    if let Some(categories) = window.categories.as_ref() {
        if categories.is_empty() {
            sql.push_str(" AND 0");
        } else {
            let placeholders: Vec<String> = categories
                .iter()
                .map(|value| {
                    params.push(value.clone());
                    format!("?{}", params.len())
                })
                .collect();
            sql.push_str(&format!(
                " AND CAST({category} AS TEXT) IN ({})",
                placeholders.join(", ")
            ));
        }
    }

    sql.push_str(&format!(
        " ORDER BY date({time}) ASC, CAST({category} AS TEXT) ASC"
    ));
    (sql, params)
}

fn parse_day(raw: Option<&str>, group: &MetricGroup) -> AppResult<NaiveDate> {
    let raw = raw.ok_or_else(|| {
        AppError::Source(format!(
            "group '{}' has a row with an unreadable '{}' value",
            group.label, group.columns.time
        ))
    })?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| AppError::Source(format!("invalid date '{raw}' in group '{}': {err}", group.label)))
}
