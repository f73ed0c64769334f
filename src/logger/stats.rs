//! Stats query engine: time-window aggregation over telemetry, computation
//! results, and the activity log.
//!
//! The engine is a read-only view over a borrowed [`SqliteStore`].

#![allow(missing_docs)]

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use rusqlite::params;
use serde::Serialize;

use crate::core::errors::Result;
use crate::load::database::METRIC_PREFIX;
use crate::logger::sqlite::{SqliteStore, format_timestamp};

// ──────────────────── standard time windows ────────────────────

/// The standard time windows used by `hwl stats` without `--window`.
pub const STANDARD_WINDOWS: &[Duration] = &[
    Duration::from_secs(10 * 60),
    Duration::from_secs(60 * 60),
    Duration::from_secs(24 * 60 * 60),
    Duration::from_secs(7 * 24 * 60 * 60),
];

// ──────────────────── stat types ────────────────────

/// Aggregated statistics for a single time window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowStats {
    pub window_secs: u64,
    pub label: String,
    pub metrics: Vec<MetricStats>,
    pub results: Vec<ResultStats>,
    pub activity: ActivityStats,
}

/// Per-metric aggregate over `performance_data`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricStats {
    pub name: String,
    pub count: u64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Per-computation-type aggregate over `computation_results`.
#[derive(Debug, Clone, Serialize)]
pub struct ResultStats {
    pub computation_type: String,
    pub runs: u64,
    pub avg_duration_ms: f64,
    pub max_duration_ms: i64,
}

/// Event counts from `activity_log`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivityStats {
    pub stress_runs: u64,
    pub cancellations: u64,
    pub drain_timeouts: u64,
    pub sink_failures: u64,
}

// ──────────────────── stats engine ────────────────────

/// Read-only query engine over the hwl database.
pub struct StatsEngine<'a> {
    db: &'a SqliteStore,
}

impl<'a> StatsEngine<'a> {
    pub fn new(db: &'a SqliteStore) -> Self {
        Self { db }
    }

    /// Stats for all standard time windows.
    pub fn summary(&self) -> Result<Vec<WindowStats>> {
        STANDARD_WINDOWS
            .iter()
            .map(|&w| self.window_stats(w))
            .collect()
    }

    /// Stats for a specific time window.
    pub fn window_stats(&self, window: Duration) -> Result<WindowStats> {
        let since = since_timestamp(window);
        Ok(WindowStats {
            window_secs: window.as_secs(),
            label: window_label(window),
            metrics: self.metric_stats(&since)?,
            results: self.result_stats(&since)?,
            activity: self.activity_stats(&since)?,
        })
    }

    /// Database stressor rows (`test_metric_<i>`) fold into one `test_metric_*` bucket.
    #[allow(clippy::cast_sign_loss)]
    fn metric_stats(&self, since: &str) -> Result<Vec<MetricStats>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT CASE WHEN substr(metric_name, 1, length(?2)) = ?2
                             THEN ?2 || '*' ELSE metric_name END AS bucket,
                        COUNT(*), AVG(metric_value), MIN(metric_value), MAX(metric_value)
                 FROM performance_data WHERE timestamp >= ?1
                 GROUP BY bucket ORDER BY bucket ASC",
            )?;
            let rows = stmt
                .query_map(params![since, METRIC_PREFIX], |row| {
                    Ok(MetricStats {
                        name: row.get(0)?,
                        count: row.get::<_, i64>(1)?.max(0) as u64,
                        avg: row.get(2)?,
                        min: row.get(3)?,
                        max: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    #[allow(clippy::cast_sign_loss)]
    fn result_stats(&self, since: &str) -> Result<Vec<ResultStats>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT computation_type, COUNT(*), AVG(duration_ms), MAX(duration_ms)
                 FROM computation_results WHERE timestamp >= ?1
                 GROUP BY computation_type ORDER BY computation_type ASC",
            )?;
            let rows = stmt
                .query_map(params![since], |row| {
                    Ok(ResultStats {
                        computation_type: row.get(0)?,
                        runs: row.get::<_, i64>(1)?.max(0) as u64,
                        avg_duration_ms: row.get(2)?,
                        max_duration_ms: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    #[allow(clippy::cast_sign_loss)]
    fn activity_stats(&self, since: &str) -> Result<ActivityStats> {
        let count = |event_type: &str| -> Result<u64> {
            Ok(self.db.count_events_since(event_type, since)?.max(0) as u64)
        };
        Ok(ActivityStats {
            stress_runs: count("stress_complete")?,
            cancellations: count("stress_cancel")?,
            drain_timeouts: count("drain_timeout")?,
            sink_failures: count("sink_write_failure")?,
        })
    }
}

// ──────────────────── utility functions ────────────────────

/// Lower bound used when a window reaches past the earliest representable time.
const EARLIEST_TIMESTAMP: &str = "0000-01-01T00:00:00.000Z";

/// Timestamp for "now minus `window`" in the stored text format.
///
/// Windows longer than chrono's date range select every row.
fn since_timestamp(window: Duration) -> String {
    i64::try_from(window.as_secs())
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| Utc::now().checked_sub_signed(delta))
        .map_or_else(|| EARLIEST_TIMESTAMP.to_string(), format_timestamp)
}

/// Human-readable label for a duration.
pub fn window_label(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 3600 {
        format!("{} min", secs / 60)
    } else if secs < 86400 {
        let h = secs / 3600;
        if h == 1 {
            "1 hour".to_string()
        } else {
            format!("{h} hours")
        }
    } else {
        let d = secs / 86400;
        if d == 1 {
            "1 day".to_string()
        } else {
            format!("{d} days")
        }
    }
}

// ──────────────────── tests ────────────────────
