//! In-memory sink used by `--dry-run` and by tests.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::core::errors::{HwlError, Result};
use crate::sink::{MetricsSink, MetricsStore, ResultRecord, ResultSink};

/// A metric row held by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMetric {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub value: f64,
}

/// Thread-safe in-memory implementation of every sink trait.
///
/// Writes can be made to fail on demand, either for every metric, for metrics
/// with a given name, or for result rows.
#[derive(Debug, Default)]
pub struct MemorySink {
    metrics: Mutex<Vec<StoredMetric>>,
    results: Mutex<Vec<ResultRecord>>,
    reads: AtomicU64,
    fail_all_metrics: AtomicBool,
    fail_results: AtomicBool,
    failing_names: Mutex<HashSet<String>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all_metric_writes(&self, fail: bool) {
        self.fail_all_metrics.store(fail, Ordering::SeqCst);
    }

    pub fn fail_metric_name(&self, name: &str) {
        self.failing_names.lock().insert(name.to_string());
    }

    pub fn fail_result_writes(&self, fail: bool) {
        self.fail_results.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn metrics(&self) -> Vec<StoredMetric> {
        self.metrics.lock().clone()
    }

    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.lock().len()
    }

    #[must_use]
    pub fn results(&self) -> Vec<ResultRecord> {
        self.results.lock().clone()
    }

    /// Number of `recent_metric_ids` calls served.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl MetricsSink for MemorySink {
    fn append_metric(&self, timestamp: DateTime<Utc>, name: &str, value: f64) -> Result<()> {
        if self.fail_all_metrics.load(Ordering::SeqCst) || self.failing_names.lock().contains(name)
        {
            return Err(HwlError::Sink {
                sink: "memory",
                details: format!("injected write failure for {name}"),
            });
        }
        let mut metrics = self.metrics.lock();
        let id = i64::try_from(metrics.len()).unwrap_or(i64::MAX).saturating_add(1);
        metrics.push(StoredMetric {
            id,
            timestamp,
            name: name.to_string(),
            value,
        });
        Ok(())
    }
}

impl MetricsStore for MemorySink {
    fn recent_metric_ids(&self, name_prefix: &str, limit: usize) -> Result<Vec<i64>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .metrics
            .lock()
            .iter()
            .rev()
            .filter(|m| m.name.starts_with(name_prefix))
            .take(limit)
            .map(|m| m.id)
            .collect())
    }
}

impl ResultSink for MemorySink {
    fn append_result(&self, record: &ResultRecord) -> Result<()> {
        if self.fail_results.load(Ordering::SeqCst) {
            return Err(HwlError::Sink {
                sink: "memory",
                details: format!("injected write failure for {}", record.computation_type),
            });
        }
        self.results.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_ids_are_newest_first_and_prefix_filtered() {
        let sink = MemorySink::new();
        let now = Utc::now();
        sink.append_metric(now, "test_metric_1", 1.0).unwrap();
        sink.append_metric(now, "cpu_load", 50.0).unwrap();
        sink.append_metric(now, "test_metric_2", 2.0).unwrap();
        sink.append_metric(now, "test_metric_3", 3.0).unwrap();

        let ids = sink.recent_metric_ids("test_metric_", 2).unwrap();
        assert_eq!(ids, vec![4, 3]);
        assert_eq!(sink.read_count(), 1);
    }

    #[test]
    fn injected_name_failure_only_hits_that_name() {
        let sink = MemorySink::new();
        sink.fail_metric_name("error_rate");
        let now = Utc::now();
        assert!(sink.append_metric(now, "cpu_load", 1.0).is_ok());
        let err = sink.append_metric(now, "error_rate", 1.0).unwrap_err();
        assert!(err.is_sink_failure());
        assert_eq!(sink.metric_count(), 1);
    }

    #[test]
    fn result_failure_toggle() {
        let sink = MemorySink::new();
        let record = ResultRecord {
            timestamp: Utc::now(),
            computation_type: "cpu_intensive".to_string(),
            input_size: 1,
            result: "acc=0".to_string(),
            duration_ms: 0,
        };
        sink.fail_result_writes(true);
        assert!(sink.append_result(&record).is_err());
        sink.fail_result_writes(false);
        sink.append_result(&record).unwrap();
        assert_eq!(sink.results(), vec![record]);
    }
}
