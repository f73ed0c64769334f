//! Daemon loop: owns the telemetry scheduler lifecycle and the activity logger.
//!
//! Threads:
//! - **Main thread**: polls signal flags, reloads config, prunes old rows
//! - **Telemetry thread**: writes one metric batch per tick (telemetry/scheduler.rs)
//! - **Logger thread**: writes to SQLite + JSONL (via dual.rs)
//!
//! SIGTERM/SIGINT stop the scheduler (any in-progress tick finishes first),
//! flush the logger, and return. SIGHUP reloads the config file; the scheduler
//! is restarted only when its cadence or enablement changed.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::{Config, SchedulerConfig};
use crate::core::errors::Result;
use crate::daemon::signals::SignalHandler;
use crate::logger::dual::{ActivityEvent, ActivityLoggerHandle, DualLoggerConfig, spawn_logger};
use crate::logger::sqlite::SqliteStore;
use crate::telemetry::scheduler::TelemetryScheduler;

/// How often the main loop wakes to check signals and housekeeping.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

// ──────────────────── daemon configuration ────────────────────

/// Arguments for `hwl daemon` subcommand.
#[derive(Debug, Clone, Default)]
pub struct DaemonArgs {
    /// Config file to re-read on SIGHUP. `None` means the default location.
    pub config_path: Option<PathBuf>,
    /// Stop on our own after this long, as if SIGTERM had arrived.
    pub run_for: Option<Duration>,
}

/// Totals reported when the daemon stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonSummary {
    pub uptime: Duration,
    pub ticks: u64,
    pub ticks_skipped: u64,
    pub pruned_rows: usize,
    pub reloads: u64,
}

// ──────────────────── main daemon struct ────────────────────

/// The telemetry daemon: a scheduler writing to SQLite plus housekeeping.
pub struct LoadDaemon {
    config: Config,
    args: DaemonArgs,
    store: Arc<SqliteStore>,
    logger_handle: ActivityLoggerHandle,
    logger_join: Option<thread::JoinHandle<()>>,
    signal_handler: SignalHandler,
    scheduler: Option<TelemetryScheduler<SqliteStore>>,
    start_time: Instant,
    last_prune: Instant,
    ticks_retired: u64,
    skipped_retired: u64,
    pruned_rows: usize,
    reloads: u64,
}

impl LoadDaemon {
    /// Build the daemon with OS signal hooks registered.
    pub fn init(config: Config, args: DaemonArgs) -> Result<Self> {
        Self::init_with_signals(config, args, SignalHandler::new())
    }

    /// Build the daemon around an existing signal handler.
    pub fn init_with_signals(
        config: Config,
        args: DaemonArgs,
        signal_handler: SignalHandler,
    ) -> Result<Self> {
        let start_time = Instant::now();

        // 1. Logger thread (own SQLite connection).
        let (logger_handle, logger_join) =
            spawn_logger(DualLoggerConfig::from_paths(&config.paths))?;

        // 2. Telemetry store.
        let store = Arc::new(SqliteStore::open(&config.paths.sqlite_db)?);

        Ok(Self {
            config,
            args,
            store,
            logger_handle,
            logger_join: Some(logger_join),
            signal_handler,
            scheduler: None,
            start_time,
            last_prune: start_time,
            ticks_retired: 0,
            skipped_retired: 0,
            pruned_rows: 0,
            reloads: 0,
        })
    }

    /// The store the scheduler writes to.
    pub fn store(&self) -> Arc<SqliteStore> {
        Arc::clone(&self.store)
    }

    pub fn signal_handler(&self) -> &SignalHandler {
        &self.signal_handler
    }

    /// Run until shutdown is requested (or `run_for` elapses).
    ///
    /// This is the main entry point for `hwl daemon`.
    pub fn run(&mut self) -> Result<DaemonSummary> {
        let config_hash = self.config.stable_hash().unwrap_or_default();
        self.logger_handle.send(ActivityEvent::DaemonStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash,
        });
        eprintln!(
            "[HWL-DAEMON] started, writing telemetry to {}",
            self.store.path().display()
        );

        if let Err(e) = self.start_scheduler() {
            self.shutdown("scheduler failed to start");
            return Err(e);
        }

        let shutdown = self.signal_handler.shutdown_token();
        let reason = loop {
            // 1. Shutdown signal.
            if self.signal_handler.should_shutdown() {
                eprintln!("[HWL-DAEMON] shutdown requested");
                break "signal";
            }

            // 2. Self-imposed deadline.
            if let Some(limit) = self.args.run_for
                && self.start_time.elapsed() >= limit
            {
                break "run-for elapsed";
            }

            // 3. Config reload (SIGHUP).
            if self.signal_handler.should_reload() {
                self.handle_config_reload();
            }

            // 4. Retention.
            self.maybe_prune();

            shutdown.wait_timeout(POLL_INTERVAL);
        };

        Ok(self.shutdown(reason))
    }

    // ──────────────────── scheduler lifecycle ────────────────────

    fn start_scheduler(&mut self) -> Result<()> {
        if !self.config.scheduler.enabled {
            eprintln!("[HWL-DAEMON] telemetry scheduler disabled by config");
            return Ok(());
        }
        let mut scheduler = TelemetryScheduler::new(
            Arc::clone(&self.store),
            &self.config.scheduler,
            Some(self.logger_handle.clone()),
        );
        scheduler.start()?;
        self.scheduler = Some(scheduler);
        Ok(())
    }

    fn stop_scheduler(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            if let Err(e) = scheduler.stop() {
                eprintln!("[HWL-DAEMON] scheduler stop failed: {e}");
                self.logger_handle.send(ActivityEvent::Error {
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
            let stats = scheduler.stats();
            self.ticks_retired += stats.ticks();
            self.skipped_retired += stats.ticks_skipped();
        }
    }

    fn ticks(&self) -> (u64, u64) {
        let (live_ticks, live_skipped) = self
            .scheduler
            .as_ref()
            .map_or((0, 0), |s| {
                let stats = s.stats();
                (stats.ticks(), stats.ticks_skipped())
            });
        (
            self.ticks_retired + live_ticks,
            self.skipped_retired + live_skipped,
        )
    }

    // ──────────────────── config reload ────────────────────

    fn handle_config_reload(&mut self) {
        eprintln!("[HWL-DAEMON] config reload requested (SIGHUP)");

        let new_config = match Config::load(self.args.config_path.as_deref()) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("[HWL-DAEMON] config reload failed: {e}");
                self.logger_handle.send(ActivityEvent::Error {
                    code: e.code().to_string(),
                    message: format!("config reload failed: {e}"),
                });
                return;
            }
        };

        let old_hash = self.config.stable_hash().unwrap_or_default();
        let new_hash = new_config.stable_hash().unwrap_or_default();
        if old_hash == new_hash {
            eprintln!("[HWL-DAEMON] config unchanged, skipping reload");
            return;
        }

        // Storage paths are fixed for the lifetime of the process.
        if new_config.paths.sqlite_db != self.config.paths.sqlite_db
            || new_config.paths.jsonl_log != self.config.paths.jsonl_log
        {
            eprintln!("[HWL-DAEMON] path changes take effect on restart");
        }

        let restart = scheduler_needs_restart(&self.config.scheduler, &new_config.scheduler);
        let mut paths = new_config.paths.clone();
        paths.sqlite_db.clone_from(&self.config.paths.sqlite_db);
        paths.jsonl_log.clone_from(&self.config.paths.jsonl_log);
        self.config = Config { paths, ..new_config };
        self.reloads += 1;

        if restart {
            self.stop_scheduler();
            if let Err(e) = self.start_scheduler() {
                eprintln!("[HWL-DAEMON] scheduler restart failed: {e}");
                self.logger_handle.send(ActivityEvent::Error {
                    code: e.code().to_string(),
                    message: format!("scheduler restart failed: {e}"),
                });
            }
        }

        self.logger_handle.send(ActivityEvent::ConfigReloaded {
            details: format!(
                "config hash: {old_hash} -> {new_hash}; scheduler {}",
                if restart { "restarted" } else { "unchanged" }
            ),
        });
        eprintln!("[HWL-DAEMON] config reloaded successfully");
    }

    // ──────────────────── retention ────────────────────

    fn maybe_prune(&mut self) {
        let storage = &self.config.storage;
        if storage.retention_days == 0 {
            return;
        }
        if self.last_prune.elapsed() < Duration::from_secs(storage.prune_interval_secs) {
            return;
        }
        self.last_prune = Instant::now();

        let retention_days = storage.retention_days;
        let pruned = self.store.prune_metrics(retention_days).and_then(|metrics| {
            Ok(metrics + self.store.prune_activity_log(retention_days)?)
        });
        match pruned {
            Ok(rows) => {
                self.pruned_rows += rows;
                if rows > 0 {
                    eprintln!("[HWL-DAEMON] pruned {rows} row(s) older than {retention_days}d");
                    self.logger_handle.send(ActivityEvent::Pruned {
                        rows,
                        retention_days,
                    });
                }
            }
            Err(e) => {
                eprintln!("[HWL-DAEMON] prune failed: {e}");
                self.logger_handle.send(ActivityEvent::Error {
                    code: e.code().to_string(),
                    message: format!("prune failed: {e}"),
                });
            }
        }
    }

    // ──────────────────── shutdown ────────────────────

    fn shutdown(&mut self, reason: &str) -> DaemonSummary {
        // 1. Stop the scheduler; an in-progress tick completes.
        self.stop_scheduler();

        let uptime = self.start_time.elapsed();
        let (ticks, ticks_skipped) = self.ticks();

        // 2. Log shutdown.
        self.logger_handle.send(ActivityEvent::DaemonStopped {
            reason: reason.to_string(),
            uptime_secs: uptime.as_secs(),
            ticks,
        });

        // 3. Shutdown logger thread.
        self.logger_handle.shutdown();
        if let Some(logger_join) = self.logger_join.take() {
            let _ = logger_join.join();
        }

        let dropped = self.logger_handle.dropped_events();
        if dropped > 0 {
            eprintln!("[HWL-DAEMON] {dropped} activity event(s) dropped under back-pressure");
        }
        eprintln!(
            "[HWL-DAEMON] shutdown complete (uptime={}s, ticks={ticks}, skipped={ticks_skipped})",
            uptime.as_secs()
        );

        DaemonSummary {
            uptime,
            ticks,
            ticks_skipped,
            pruned_rows: self.pruned_rows,
            reloads: self.reloads,
        }
    }
}

fn scheduler_needs_restart(old: &SchedulerConfig, new: &SchedulerConfig) -> bool {
    old.enabled != new.enabled || old.period_ms != new.period_ms
}

// ──────────────────── tests ────────────────────
