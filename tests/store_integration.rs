//! End-to-end runs against the SQLite store: scheduler ticks, stressors, and
//! the activity logger sharing one database file.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use harborwatch_lite::core::cancel::CancelToken;
use harborwatch_lite::core::config::{CombinedConfig, PathsConfig, SchedulerConfig};
use harborwatch_lite::load::controller::LoadController;
use harborwatch_lite::logger::dual::{DualLoggerConfig, spawn_logger};
use harborwatch_lite::logger::sqlite::SqliteStore;
use harborwatch_lite::telemetry::scheduler::{SchedulerState, TelemetryScheduler};

fn paths_in(dir: &std::path::Path) -> PathsConfig {
    PathsConfig {
        config_file: dir.join("config.toml"),
        sqlite_db: dir.join("hwl.sqlite3"),
        jsonl_log: dir.join("activity.jsonl"),
    }
}

fn quick_combined() -> CombinedConfig {
    CombinedConfig {
        dispatch_quantum_ms: 50,
        cpu_iterations: 5_000,
        memory_mb: 1,
        database_ops: 10,
        ..CombinedConfig::default()
    }
}

#[test]
fn scheduler_and_combined_share_the_store() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = paths_in(tmp.path());
    let store = Arc::new(SqliteStore::open(&paths.sqlite_db).unwrap());
    let (logger, logger_join) = spawn_logger(DualLoggerConfig::from_paths(&paths)).unwrap();

    let sched_config = SchedulerConfig {
        enabled: true,
        initial_delay_ms: 0,
        period_ms: 100,
    };
    let mut scheduler =
        TelemetryScheduler::new(Arc::clone(&store), &sched_config, Some(logger.clone()));
    scheduler.start().unwrap();

    let controller = LoadController::new(
        Arc::clone(&store),
        Arc::clone(&store),
        quick_combined(),
        Some(logger.clone()),
    );
    let combined = controller.combined(1, &CancelToken::new()).unwrap();

    scheduler.stop().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    logger.shutdown();
    logger_join.join().unwrap();

    // Telemetry rows come in complete groups of four per timestamp.
    let mut per_ts: BTreeMap<String, usize> = BTreeMap::new();
    for name in ["cpu_load", "memory_usage", "request_count", "error_rate"] {
        for row in store.recent_metrics(10_000, Some(name)).unwrap() {
            *per_ts.entry(row.timestamp).or_default() += 1;
        }
    }
    let ticks = scheduler.stats().ticks();
    assert!(ticks >= 1);
    assert_eq!(per_ts.len() as u64, ticks);
    assert!(per_ts.values().all(|&n| n == 4));
    for ts in per_ts.keys() {
        let names: Vec<String> = store
            .metrics_at(ts)
            .unwrap()
            .into_iter()
            .map(|row| row.metric_name)
            .filter(|name| !name.starts_with("test_metric_"))
            .collect();
        assert_eq!(
            names,
            ["cpu_load", "memory_usage", "request_count", "error_rate"]
        );
    }

    // One result row for the combined run.
    let results = store.recent_results(10).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].computation_type, "combined_stress");
    assert_eq!(results[0].result, combined.summary_text());

    let events: Vec<String> = store
        .recent_activity(1_000)
        .unwrap()
        .into_iter()
        .map(|row| row.event_type)
        .collect();
    assert!(events.iter().any(|e| e == "stress_complete"));
}

#[test]
fn sequential_stressors_each_record_a_row() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&tmp.path().join("hwl.sqlite3")).unwrap());
    let controller =
        LoadController::new(Arc::clone(&store), Arc::clone(&store), quick_combined(), None);

    controller.cpu(1_000).unwrap();
    controller.memory(2).unwrap();
    let db = controller.database(100).unwrap();
    assert_eq!(db.summary_text(), "ok");

    let mut types: Vec<String> = store
        .recent_results(10)
        .unwrap()
        .into_iter()
        .map(|r| r.computation_type)
        .collect();
    types.sort();
    assert_eq!(
        types,
        ["cpu_intensive", "database_intensive", "memory_intensive"]
    );
    assert_eq!(
        store.recent_metrics(1_000, None).unwrap().len(),
        100,
        "database stressor rows"
    );
}

#[test]
fn cancelled_combined_run_leaves_no_result_row() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&tmp.path().join("hwl.sqlite3")).unwrap());
    let controller =
        LoadController::new(Arc::clone(&store), Arc::clone(&store), quick_combined(), None);

    let cancel = CancelToken::new();
    let remote = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        remote.cancel();
    });
    let err = controller.combined(30, &cancel).unwrap_err();
    canceller.join().unwrap();

    assert_eq!(err.code(), "HWL-2202");
    assert!(store.recent_results(10).unwrap().is_empty());
}
