//! Dual-write coordinator: writes to both SQLite and JSONL with graceful degradation.
//!
//! Architecture: a dedicated logger thread owns its own `SqliteStore` connection
//! and the `JsonlWriter`. All other threads send `ActivityEvent` via a bounded
//! crossbeam channel. Non-blocking `try_send()` keeps stress workers and the
//! scheduler tick from ever waiting on logging.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{HwlError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
#[cfg(feature = "sqlite")]
use crate::logger::sqlite::{ActivityRow, SqliteStore};

// ──────────────────── channel capacity ────────────────────

/// Default bounded channel capacity for log events.
pub const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── public event type ────────────────────

/// Events that can be logged through the dual-write coordinator.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    DaemonStarted {
        version: String,
        config_hash: String,
    },
    DaemonStopped {
        reason: String,
        uptime_secs: u64,
        ticks: u64,
    },
    ConfigReloaded {
        details: String,
    },
    StressCompleted {
        kind: &'static str,
        magnitude: u64,
        summary: String,
        duration_ms: u64,
    },
    StressCancelled {
        kind: &'static str,
        completed_tasks: u64,
        duration_ms: u64,
    },
    DrainTimedOut {
        component: &'static str,
        outstanding: usize,
        grace_secs: u64,
        completed_tasks: u64,
    },
    SinkWriteFailed {
        component: &'static str,
        target: String,
        error_code: String,
        error_message: String,
    },
    /// Logged to JSONL only; the samples themselves live in `performance_data`.
    TelemetryTick {
        timestamp: String,
        written: u64,
        failed: u64,
        duration_ms: u64,
    },
    TicksSkipped {
        count: u64,
    },
    Pruned {
        rows: usize,
        retention_days: u64,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Thread-safe, cheaply-cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events counter
    /// is incremented.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Join its handle to wait.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

/// Report a swallowed sink failure: one stderr line plus an activity event.
pub fn report_sink_failure(
    logger: Option<&ActivityLoggerHandle>,
    component: &'static str,
    target: &str,
    err: &HwlError,
) {
    eprintln!("[HWL-SINK] {component} write to {target} failed: {err}");
    if let Some(logger) = logger {
        logger.send(ActivityEvent::SinkWriteFailed {
            component,
            target: target.to_string(),
            error_code: err.code().to_string(),
            error_message: err.to_string(),
        });
    }
}

// ──────────────────── configuration ────────────────────

/// Options for building the dual-write logger.
pub struct DualLoggerConfig {
    /// Path to the SQLite database. `None` disables SQLite.
    pub sqlite_path: Option<PathBuf>,
    /// JSONL writer config (always active).
    pub jsonl_config: JsonlConfig,
    pub channel_capacity: usize,
}

impl DualLoggerConfig {
    /// Logger writing next to the configured data files.
    #[must_use]
    pub fn from_paths(paths: &crate::core::config::PathsConfig) -> Self {
        Self {
            sqlite_path: Some(paths.sqlite_db.clone()),
            jsonl_config: JsonlConfig::at(&paths.jsonl_log),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread and return a handle.
///
/// The logger thread runs until `handle.shutdown()` is called or all senders
/// are dropped.
pub fn spawn_logger(
    config: DualLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("hwl-logger".to_string())
        .spawn(move || {
            logger_thread_main(rx, config.sqlite_path, config.jsonl_config, dropped_clone);
        })
        .map_err(|e| HwlError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── logger thread ────────────────────

#[allow(clippy::needless_pass_by_value)]
fn logger_thread_main(
    rx: Receiver<ActivityEvent>,
    sqlite_path: Option<PathBuf>,
    jsonl_config: JsonlConfig,
    dropped: Arc<AtomicU64>,
) {
    #[cfg(feature = "sqlite")]
    let mut sqlite = sqlite_path.and_then(|p| match SqliteStore::open(&p) {
        Ok(db) => Some(db),
        Err(e) => {
            eprintln!("[HWL-SQLITE] failed to open SQLite at {}: {e}", p.display());
            None
        }
    });
    #[cfg(not(feature = "sqlite"))]
    let _ = sqlite_path;

    let mut jsonl = JsonlWriter::open(jsonl_config);
    #[cfg(feature = "sqlite")]
    let mut sqlite_failures: u32 = 0;

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }

        jsonl.write_entry(&event_to_log_entry(&event));

        #[cfg(feature = "sqlite")]
        {
            if let Some(db) = &sqlite
                && let Some(row) = event_to_activity_row(&event)
            {
                if db.log_activity(&row).is_ok() {
                    sqlite_failures = 0;
                } else {
                    sqlite_failures += 1;
                    if sqlite_failures >= 3 {
                        eprintln!(
                            "[HWL-SQLITE] SQLite write failed {sqlite_failures} times, disabling"
                        );
                        sqlite = None;
                    }
                }
            }
        }
    }

    jsonl.flush();
    jsonl.fsync();
}

// ──────────────────── event conversion ────────────────────

const fn severity_of(event: &ActivityEvent) -> Severity {
    match event {
        ActivityEvent::DrainTimedOut { .. }
        | ActivityEvent::SinkWriteFailed { .. }
        | ActivityEvent::TicksSkipped { .. }
        | ActivityEvent::StressCancelled { .. } => Severity::Warning,
        ActivityEvent::Error { .. } => Severity::Critical,
        _ => Severity::Info,
    }
}

const fn event_type_of(event: &ActivityEvent) -> EventType {
    match event {
        ActivityEvent::DaemonStarted { .. } => EventType::DaemonStart,
        ActivityEvent::DaemonStopped { .. } | ActivityEvent::Shutdown => EventType::DaemonStop,
        ActivityEvent::ConfigReloaded { .. } => EventType::ConfigReload,
        ActivityEvent::StressCompleted { .. } => EventType::StressComplete,
        ActivityEvent::StressCancelled { .. } => EventType::StressCancel,
        ActivityEvent::DrainTimedOut { .. } => EventType::DrainTimeout,
        ActivityEvent::SinkWriteFailed { .. } => EventType::SinkWriteFailure,
        ActivityEvent::TelemetryTick { .. } => EventType::TelemetryTick,
        ActivityEvent::TicksSkipped { .. } => EventType::TicksSkipped,
        ActivityEvent::Pruned { .. } => EventType::Prune,
        ActivityEvent::Error { .. } => EventType::Error,
    }
}

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    let mut e = LogEntry::new(event_type_of(event), severity_of(event));
    match event {
        ActivityEvent::DaemonStarted {
            version,
            config_hash,
        } => {
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e.ok = Some(true);
        }
        ActivityEvent::DaemonStopped {
            reason,
            uptime_secs,
            ticks,
        } => {
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s"));
            e.count = Some(*ticks);
            e.ok = Some(true);
        }
        ActivityEvent::ConfigReloaded { details } => {
            e.details = Some(details.clone());
            e.ok = Some(true);
        }
        ActivityEvent::StressCompleted {
            kind,
            magnitude,
            summary,
            duration_ms,
        } => {
            e.kind = Some((*kind).to_string());
            e.magnitude = Some(*magnitude);
            e.summary = Some(summary.clone());
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
        }
        ActivityEvent::StressCancelled {
            kind,
            completed_tasks,
            duration_ms,
        } => {
            e.kind = Some((*kind).to_string());
            e.count = Some(*completed_tasks);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(false);
        }
        ActivityEvent::DrainTimedOut {
            component,
            outstanding,
            grace_secs,
            completed_tasks,
        } => {
            e.component = Some((*component).to_string());
            e.count = Some(*completed_tasks);
            e.error_code = Some("HWL-2201".to_string());
            e.details = Some(format!(
                "outstanding_workers={outstanding} grace={grace_secs}s"
            ));
            e.ok = Some(false);
        }
        ActivityEvent::SinkWriteFailed {
            component,
            target,
            error_code,
            error_message,
        } => {
            e.component = Some((*component).to_string());
            e.details = Some(format!("target={target}"));
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e.ok = Some(false);
        }
        ActivityEvent::TelemetryTick {
            timestamp,
            written,
            failed,
            duration_ms,
        } => {
            e.component = Some("scheduler".to_string());
            e.count = Some(*written);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!("sample_ts={timestamp} failed={failed}"));
            e.ok = Some(*failed == 0);
        }
        ActivityEvent::TicksSkipped { count } => {
            e.component = Some("scheduler".to_string());
            e.count = Some(*count);
        }
        ActivityEvent::Pruned {
            rows,
            retention_days,
        } => {
            e.count = Some(*rows as u64);
            e.details = Some(format!("retention_days={retention_days}"));
            e.ok = Some(true);
        }
        ActivityEvent::Error { code, message } => {
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
        }
        ActivityEvent::Shutdown => {}
    }
    e
}

#[cfg(feature = "sqlite")]
fn event_to_activity_row(event: &ActivityEvent) -> Option<ActivityRow> {
    // Ticks fire every few seconds; the samples are already in performance_data.
    if matches!(
        event,
        ActivityEvent::TelemetryTick { .. } | ActivityEvent::Shutdown
    ) {
        return None;
    }

    let entry = event_to_log_entry(event);
    Some(ActivityRow {
        timestamp: entry.ts,
        event_type: entry.event.as_str().to_string(),
        severity: entry.severity.as_str().to_string(),
        component: entry.component.or(entry.kind),
        duration_ms: entry
            .duration_ms
            .map(|ms| i64::try_from(ms).unwrap_or(i64::MAX)),
        success: i32::from(entry.ok.unwrap_or(true)),
        error_code: entry.error_code,
        error_message: entry.error_message,
        details: entry.details.or(entry.summary),
    })
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path, sqlite: bool) -> DualLoggerConfig {
        DualLoggerConfig {
            sqlite_path: sqlite.then(|| dir.join("test.db")),
            jsonl_config: JsonlConfig {
                path: dir.join("test.jsonl"),
                fallback_path: None,
                max_size_bytes: 10 * 1024 * 1024,
                max_rotated_files: 3,
                fsync_interval_secs: 60,
            },
            channel_capacity: 64,
        }
    }

    #[test]
    fn spawn_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path(), true)).unwrap();
        handle.send(ActivityEvent::DaemonStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc".to_string(),
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert!(contents.contains("daemon_start"));
    }

    #[test]
    fn ticks_go_to_jsonl_but_not_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path(), true)).unwrap();

        handle.send(ActivityEvent::TelemetryTick {
            timestamp: "2026-02-14T16:30:00.000Z".to_string(),
            written: 4,
            failed: 0,
            duration_ms: 2,
        });
        handle.send(ActivityEvent::StressCompleted {
            kind: "cpu_intensive",
            magnitude: 1_000,
            summary: "acc=1.5".to_string(),
            duration_ms: 3,
        });
        handle.send(ActivityEvent::DrainTimedOut {
            component: "combined",
            outstanding: 2,
            grace_secs: 30,
            completed_tasks: 17,
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.contains("telemetry_tick"));

        #[cfg(feature = "sqlite")]
        {
            let db = SqliteStore::open(&dir.path().join("test.db")).unwrap();
            let rows = db.recent_activity(10).unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].event_type, "drain_timeout");
            assert_eq!(rows[0].success, 0);
            assert_eq!(rows[0].error_code.as_deref(), Some("HWL-2201"));
            assert_eq!(rows[1].event_type, "stress_complete");
            assert_eq!(rows[1].component.as_deref(), Some("cpu_intensive"));
            assert_eq!(rows[1].details.as_deref(), Some("acc=1.5"));
        }
    }

    #[test]
    fn handles_cloneable_and_send() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path(), false)).unwrap();
        let h2 = handle.clone();

        let t = std::thread::spawn(move || {
            h2.send(ActivityEvent::TicksSkipped { count: 2 });
        });
        t.join().unwrap();
        handle.send(ActivityEvent::Error {
            code: "HWL-3900".to_string(),
            message: "test error".to_string(),
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("HWL-3900"));
        assert_eq!(handle.dropped_events(), 0);
    }

    #[test]
    fn severity_mapping() {
        assert_eq!(
            severity_of(&ActivityEvent::TicksSkipped { count: 1 }),
            Severity::Warning
        );
        assert_eq!(
            severity_of(&ActivityEvent::Error {
                code: String::new(),
                message: String::new()
            }),
            Severity::Critical
        );
        assert_eq!(
            severity_of(&ActivityEvent::ConfigReloaded {
                details: String::new()
            }),
            Severity::Info
        );
    }
}
