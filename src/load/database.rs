//! Database stressor: sequential inserts with periodic read-backs.

use std::hint::black_box;
use std::time::Instant;

use chrono::Utc;
use rand::Rng;

use crate::load::caps;
use crate::load::result::{LoadPayload, LoadResult};
use crate::logger::dual::{ActivityLoggerHandle, report_sink_failure};
use crate::sink::MetricsStore;

/// Name prefix of rows written by this stressor.
pub const METRIC_PREFIX: &str = "test_metric_";
/// One read-back query every this many inserts.
pub const READ_EVERY: u64 = 25;
/// Rows fetched by each read-back.
pub const READ_LIMIT: usize = 5;

/// Perform `clamp(requested, 1, 10000)` inserts of `test_metric_<i>` with a
/// random value in `[0, 100)`, plus one read of the five newest matching rows
/// every 25th iteration.
///
/// Store failures are logged and counted, never propagated: the loop always
/// runs to completion.
pub fn run_database<S>(
    requested_ops: i64,
    store: &S,
    logger: Option<&ActivityLoggerHandle>,
) -> LoadResult
where
    S: MetricsStore + ?Sized,
{
    let ops = caps::DATABASE_OPS.clamp(requested_ops);
    let start = Instant::now();
    let mut rng = rand::rng();
    let mut reads = 0_u64;
    let mut failed_ops = 0_u64;

    for i in 1..=ops {
        let name = format!("{METRIC_PREFIX}{i}");
        let value: f64 = rng.random_range(0.0..100.0);
        if let Err(e) = store.append_metric(Utc::now(), &name, value) {
            failed_ops += 1;
            if failed_ops == 1 {
                report_sink_failure(logger, "database_intensive", &name, &e);
            }
        }

        if i % READ_EVERY == 0 {
            reads += 1;
            match store.recent_metric_ids(METRIC_PREFIX, READ_LIMIT) {
                Ok(ids) => {
                    black_box(ids);
                }
                Err(e) => {
                    failed_ops += 1;
                    if failed_ops == 1 {
                        report_sink_failure(logger, "database_intensive", "read-back", &e);
                    }
                }
            }
        }
    }

    if failed_ops > 1 {
        eprintln!("[HWL-LOAD] database_intensive: {failed_ops} of {ops} operations failed");
    }

    LoadResult {
        magnitude: ops,
        payload: LoadPayload::Database { reads, failed_ops },
        duration: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::memory::MemorySink;

    fn reads_and_failures(r: &LoadResult) -> (u64, u64) {
        match r.payload {
            LoadPayload::Database { reads, failed_ops } => (reads, failed_ops),
            ref other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn oversized_request_clamps_to_cap_with_proportional_reads() {
        let sink = MemorySink::new();
        let r = run_database(50_000, &sink, None);
        assert_eq!(r.magnitude, 10_000);
        assert_eq!(sink.metric_count(), 10_000);
        assert_eq!(sink.read_count(), 400);
        assert_eq!(reads_and_failures(&r), (400, 0));
        assert_eq!(r.summary_text(), "ok");
    }

    #[test]
    fn names_and_values_follow_insert_order() {
        let sink = MemorySink::new();
        let _ = run_database(30, &sink, None);
        let rows = sink.metrics();
        assert_eq!(rows.len(), 30);
        for (idx, row) in rows.iter().enumerate() {
            assert_eq!(row.name, format!("test_metric_{}", idx + 1));
            assert!((0.0..100.0).contains(&row.value));
        }
        assert_eq!(sink.read_count(), 1);
    }

    #[test]
    fn zero_request_still_inserts_once() {
        let sink = MemorySink::new();
        let r = run_database(0, &sink, None);
        assert_eq!(r.magnitude, 1);
        assert_eq!(sink.metric_count(), 1);
        assert_eq!(reads_and_failures(&r), (0, 0));
    }

    #[test]
    fn write_failures_are_swallowed_and_counted() {
        let sink = MemorySink::new();
        sink.fail_all_metric_writes(true);
        let r = run_database(50, &sink, None);
        assert_eq!(r.magnitude, 50);
        assert_eq!(sink.metric_count(), 0);
        // Reads still run; they just find nothing.
        assert_eq!(reads_and_failures(&r), (2, 50));
        assert_eq!(r.summary_text(), "errors=50");
    }
}
