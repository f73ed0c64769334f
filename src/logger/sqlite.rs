//! SQLite store: WAL-mode database holding telemetry samples, computation
//! results, and the activity log.
//!
//! One `SqliteStore` implements every sink trait. The connection is guarded by
//! a mutex so worker threads of the combined orchestrator can share a store.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use serde::Serialize;

use crate::core::errors::{HwlError, Result};
use crate::sink::{MetricsSink, MetricsStore, ResultRecord, ResultSink};

/// SQLite-backed store with WAL mode and cached prepared statements.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| HwlError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        apply_pragmas(&conn)?;
        apply_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ──────────────────── performance_data ────────────────────

    /// Query recent telemetry rows, newest first, optionally for one metric name.
    pub fn recent_metrics(&self, limit: u32, name: Option<&str>) -> Result<Vec<MetricRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, timestamp, metric_name, metric_value, metadata
             FROM performance_data
             WHERE ?1 IS NULL OR metric_name = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![name, limit], |row| {
                Ok(MetricRow {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    metric_name: row.get(2)?,
                    metric_value: row.get(3)?,
                    metadata: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All telemetry rows written with exactly this timestamp, in insertion order.
    pub fn metrics_at(&self, timestamp: &str) -> Result<Vec<MetricRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, timestamp, metric_name, metric_value, metadata
             FROM performance_data WHERE timestamp = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![timestamp], |row| {
                Ok(MetricRow {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    metric_name: row.get(2)?,
                    metric_value: row.get(3)?,
                    metadata: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete telemetry rows older than `retention_days`. Returns rows deleted.
    pub fn prune_metrics(&self, retention_days: u64) -> Result<usize> {
        let cutoff = retention_cutoff(retention_days);
        let deleted = self.conn.lock().execute(
            "DELETE FROM performance_data WHERE timestamp < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    // ──────────────────── computation_results ────────────────────

    /// Query recent computation results, newest first.
    pub fn recent_results(&self, limit: u32) -> Result<Vec<ResultRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, timestamp, computation_type, input_size, result, duration_ms
             FROM computation_results ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(ResultRow {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    computation_type: row.get(2)?,
                    input_size: row.get(3)?,
                    result: row.get(4)?,
                    duration_ms: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ──────────────────── activity_log ────────────────────

    /// Insert a row into `activity_log`.
    pub fn log_activity(&self, row: &ActivityRow) -> Result<()> {
        self.conn
            .lock()
            .prepare_cached(
                "INSERT INTO activity_log (
                timestamp, event_type, severity, component, duration_ms,
                success, error_code, error_message, details
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            )?
            .execute(params![
                row.timestamp,
                row.event_type,
                row.severity,
                row.component,
                row.duration_ms,
                row.success,
                row.error_code,
                row.error_message,
                row.details,
            ])?;
        Ok(())
    }

    /// Query recent activity entries, newest first.
    pub fn recent_activity(&self, limit: u32) -> Result<Vec<ActivityRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT timestamp, event_type, severity, component, duration_ms,
                    success, error_code, error_message, details
             FROM activity_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(ActivityRow {
                    timestamp: row.get(0)?,
                    event_type: row.get(1)?,
                    severity: row.get(2)?,
                    component: row.get(3)?,
                    duration_ms: row.get(4)?,
                    success: row.get(5)?,
                    error_code: row.get(6)?,
                    error_message: row.get(7)?,
                    details: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count activity entries of a given event_type since a timestamp.
    pub fn count_events_since(&self, event_type: &str, since: &str) -> Result<i64> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM activity_log WHERE event_type = ?1 AND timestamp >= ?2",
            params![event_type, since],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete activity_log rows older than `retention_days`.
    pub fn prune_activity_log(&self, retention_days: u64) -> Result<usize> {
        let cutoff = retention_cutoff(retention_days);
        let deleted = self.conn.lock().execute(
            "DELETE FROM activity_log WHERE timestamp < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    /// Run a closure against the locked connection (for the stats engine).
    pub(crate) fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Check that WAL mode is active (for diagnostics).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .lock()
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }
}

impl MetricsSink for SqliteStore {
    fn append_metric(&self, timestamp: DateTime<Utc>, name: &str, value: f64) -> Result<()> {
        self.conn
            .lock()
            .prepare_cached(
                "INSERT INTO performance_data (timestamp, metric_name, metric_value)
                 VALUES (?1, ?2, ?3)",
            )?
            .execute(params![format_timestamp(timestamp), name, value])?;
        Ok(())
    }
}

impl MetricsStore for SqliteStore {
    fn recent_metric_ids(&self, name_prefix: &str, limit: usize) -> Result<Vec<i64>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id FROM performance_data
             WHERE substr(metric_name, 1, length(?1)) = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![name_prefix, limit], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}

impl ResultSink for SqliteStore {
    fn append_result(&self, record: &ResultRecord) -> Result<()> {
        let duration_ms = i64::try_from(record.duration_ms).unwrap_or(i64::MAX);
        self.conn
            .lock()
            .prepare_cached(
                "INSERT INTO computation_results (
                timestamp, computation_type, input_size, result, duration_ms
            ) VALUES (?1,?2,?3,?4,?5)",
            )?
            .execute(params![
                format_timestamp(record.timestamp),
                record.computation_type,
                record.input_size,
                record.result,
                duration_ms,
            ])?;
        Ok(())
    }
}

// ──────────────────── row types ────────────────────

/// Row of the `performance_data` table.
#[derive(Debug, Clone, Serialize)]
pub struct MetricRow {
    pub id: i64,
    pub timestamp: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub metadata: String,
}

/// Row of the `computation_results` table.
#[derive(Debug, Clone, Serialize)]
pub struct ResultRow {
    pub id: i64,
    pub timestamp: String,
    pub computation_type: String,
    pub input_size: i64,
    pub result: String,
    pub duration_ms: i64,
}

/// Row of the `activity_log` table.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRow {
    pub timestamp: String,
    pub event_type: String,
    pub severity: String,
    pub component: Option<String>,
    pub duration_ms: Option<i64>,
    pub success: i32,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub details: Option<String>,
}

/// Canonical text form of stored timestamps. Lexicographic order matches time order.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn retention_cutoff(retention_days: u64) -> String {
    let days = i64::try_from(retention_days).unwrap_or(i64::MAX / 86_400);
    let cutoff = Utc::now() - chrono::Duration::days(days.min(365_000));
    format_timestamp(cutoff)
}

// ──────────────────── schema & pragmas ────────────────────

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        eprintln!("[HWL-SQLITE] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS performance_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            metric_name TEXT NOT NULL,
            metric_value REAL NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS computation_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            computation_type TEXT NOT NULL,
            input_size INTEGER NOT NULL,
            result TEXT NOT NULL,
            duration_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            component TEXT,
            duration_ms INTEGER,
            success INTEGER NOT NULL DEFAULT 1,
            error_code TEXT,
            error_message TEXT,
            details TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_perf_timestamp ON performance_data(timestamp);
        CREATE INDEX IF NOT EXISTS idx_perf_name_id ON performance_data(metric_name, id);
        CREATE INDEX IF NOT EXISTS idx_results_timestamp ON computation_results(timestamp);
        CREATE INDEX IF NOT EXISTS idx_activity_timestamp ON activity_log(timestamp);
        CREATE INDEX IF NOT EXISTS idx_activity_type_time ON activity_log(event_type, timestamp);",
    )?;
    Ok(())
}

// ──────────────────── tests ────────────────────
