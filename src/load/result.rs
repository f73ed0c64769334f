//! Immutable outcome of one stressor or orchestrator run.

#![allow(missing_docs)]

use std::time::Duration;

use chrono::Utc;
use serde::{Serialize, Serializer};

use crate::sink::ResultRecord;

/// Which subsystem a run exercised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadKind {
    Cpu,
    Memory,
    Database,
    Combined,
}

impl LoadKind {
    /// Label stored in `computation_results.computation_type`.
    #[must_use]
    pub const fn computation_type(self) -> &'static str {
        match self {
            Self::Cpu => "cpu_intensive",
            Self::Memory => "memory_intensive",
            Self::Database => "database_intensive",
            Self::Combined => "combined_stress",
        }
    }
}

impl std::fmt::Display for LoadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.computation_type())
    }
}

/// Kind-specific output of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadPayload {
    Cpu { accumulator: f64 },
    Memory { checksum: i64 },
    Database { reads: u64, failed_ops: u64 },
    Combined { task_count: u64, submitted: u64 },
}

/// Result summary of a stressor or combined run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadResult {
    /// Effective magnitude after clamping (iterations, MiB, ops, or seconds).
    pub magnitude: u64,
    #[serde(flatten)]
    pub payload: LoadPayload,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl LoadResult {
    #[must_use]
    pub const fn kind(&self) -> LoadKind {
        match self.payload {
            LoadPayload::Cpu { .. } => LoadKind::Cpu,
            LoadPayload::Memory { .. } => LoadKind::Memory,
            LoadPayload::Database { .. } => LoadKind::Database,
            LoadPayload::Combined { .. } => LoadKind::Combined,
        }
    }

    /// Short text stored in `computation_results.result`.
    #[must_use]
    pub fn summary_text(&self) -> String {
        match self.payload {
            LoadPayload::Cpu { accumulator } => format!("acc={accumulator}"),
            LoadPayload::Memory { checksum } => format!("checksum={checksum}"),
            LoadPayload::Database {
                failed_ops: 0, ..
            } => "ok".to_string(),
            LoadPayload::Database { failed_ops, .. } => format!("errors={failed_ops}"),
            LoadPayload::Combined { task_count, .. } => format!("tasks={task_count}"),
        }
    }

    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Row for the result sink, stamped with the current time.
    #[must_use]
    pub fn to_record(&self) -> ResultRecord {
        ResultRecord {
            timestamp: Utc::now(),
            computation_type: self.kind().computation_type().to_string(),
            input_size: i64::try_from(self.magnitude).unwrap_or(i64::MAX),
            result: self.summary_text(),
            duration_ms: self.duration_ms(),
        }
    }
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_payload() {
        let r = LoadResult {
            magnitude: 10,
            payload: LoadPayload::Memory { checksum: 11_520 },
            duration: Duration::from_millis(5),
        };
        assert_eq!(r.kind(), LoadKind::Memory);
        assert_eq!(r.summary_text(), "checksum=11520");
    }

    #[test]
    fn database_summary_reports_failures() {
        let ok = LoadResult {
            magnitude: 50,
            payload: LoadPayload::Database {
                reads: 2,
                failed_ops: 0,
            },
            duration: Duration::ZERO,
        };
        assert_eq!(ok.summary_text(), "ok");
        let degraded = LoadResult {
            payload: LoadPayload::Database {
                reads: 2,
                failed_ops: 3,
            },
            ..ok
        };
        assert_eq!(degraded.summary_text(), "errors=3");
    }

    #[test]
    fn record_carries_type_magnitude_and_duration() {
        let r = LoadResult {
            magnitude: 12,
            payload: LoadPayload::Combined {
                task_count: 99,
                submitted: 99,
            },
            duration: Duration::from_millis(12_345),
        };
        let record = r.to_record();
        assert_eq!(record.computation_type, "combined_stress");
        assert_eq!(record.input_size, 12);
        assert_eq!(record.result, "tasks=99");
        assert_eq!(record.duration_ms, 12_345);
    }

    #[test]
    fn json_shape_is_flat() {
        let r = LoadResult {
            magnitude: 1,
            payload: LoadPayload::Cpu { accumulator: 0.5 },
            duration: Duration::from_millis(3),
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["kind"], "cpu");
        assert_eq!(v["magnitude"], 1);
        assert_eq!(v["accumulator"], 0.5);
        assert_eq!(v["duration_ms"], 3);
    }
}
