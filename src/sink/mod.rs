//! Append-only destinations for telemetry samples and computation summaries.
//!
//! The load engine never knows where rows end up. Stressors and the scheduler
//! talk to these traits; the SQLite store and the in-memory sink implement them.

#![allow(missing_docs)]

pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// Append-only writer of timestamped numeric samples.
pub trait MetricsSink: Send + Sync {
    fn append_metric(&self, timestamp: DateTime<Utc>, name: &str, value: f64) -> Result<()>;
}

/// A metrics sink that can also answer the database stressor's read-back query.
pub trait MetricsStore: MetricsSink {
    /// Ids of the `limit` most recent samples whose name starts with `name_prefix`.
    fn recent_metric_ids(&self, name_prefix: &str, limit: usize) -> Result<Vec<i64>>;
}

/// Append-only writer of computation summaries.
pub trait ResultSink: Send + Sync {
    fn append_result(&self, record: &ResultRecord) -> Result<()>;
}

/// One row of the `computation_results` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub timestamp: DateTime<Utc>,
    /// `cpu_intensive`, `memory_intensive`, `database_intensive`, or `combined_stress`.
    pub computation_type: String,
    pub input_size: i64,
    pub result: String,
    pub duration_ms: u64,
}
