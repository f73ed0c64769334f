//! Combined stress orchestrator: a time-boxed dispatch loop feeding the three
//! stressors to a fixed worker pool, followed by a bounded drain.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::cancel::CancelToken;
use crate::core::config::CombinedConfig;
use crate::core::errors::{HwlError, Result};
use crate::load::caps;
use crate::load::cpu::run_cpu;
use crate::load::database::run_database;
use crate::load::memory::run_memory;
use crate::load::pool::{Job, WorkerPool};
use crate::load::result::{LoadKind, LoadPayload, LoadResult};
use crate::logger::dual::{ActivityEvent, ActivityLoggerHandle};
use crate::sink::MetricsStore;

/// Tasks submitted per dispatch cycle: CPU, memory, database.
pub const TASKS_PER_CYCLE: u64 = 3;

/// Drives [`run`](Self::run) with a fixed set of knobs.
pub struct CombinedStress {
    config: CombinedConfig,
    logger: Option<ActivityLoggerHandle>,
}

impl CombinedStress {
    #[must_use]
    pub fn new(config: CombinedConfig, logger: Option<ActivityLoggerHandle>) -> Self {
        Self { config, logger }
    }

    /// Dispatch mixed work for `clamp(requested_secs, 1, 60)` seconds, then drain.
    ///
    /// The reported duration spans entry to the end of the drain. A drain that
    /// exceeds the grace period is logged and the best-known task count is
    /// returned. If `cancel` fires, dispatch stops, the drain still runs, and
    /// the call fails with [`HwlError::Cancelled`] carrying the drained count.
    pub fn run<S>(
        &self,
        requested_secs: i64,
        store: &Arc<S>,
        cancel: &CancelToken,
    ) -> Result<LoadResult>
    where
        S: MetricsStore + ?Sized + 'static,
    {
        let secs = caps::COMBINED_SECS.clamp(requested_secs);
        let start = Instant::now();
        let deadline = start + Duration::from_secs(secs);
        let quantum = self.config.dispatch_quantum();

        let pool = WorkerPool::start(
            self.config.workers,
            self.config.queue_capacity,
            "hwl-combined",
        )?;

        let mut submitted = 0_u64;
        let mut cycles = 0_u64;
        let mut cancelled = false;

        while Instant::now() < deadline {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            for job in self.cycle_jobs(store) {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if pool.submit(job, remaining.min(quantum)) {
                    submitted += 1;
                }
            }
            cycles += 1;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if cancel.wait_timeout(quantum.min(remaining)) {
                cancelled = true;
                break;
            }
        }

        let grace = self.config.drain_grace();
        let drain = pool.drain(grace);
        let duration = start.elapsed();

        if drain.timed_out() {
            let err = HwlError::DrainTimeout {
                outstanding: drain.outstanding_workers,
                grace_secs: grace.as_secs(),
            };
            eprintln!(
                "[HWL-POOL] {err}; reporting {} completed task(s)",
                drain.completed
            );
            self.emit(ActivityEvent::DrainTimedOut {
                component: LoadKind::Combined.computation_type(),
                outstanding: drain.outstanding_workers,
                grace_secs: grace.as_secs(),
                completed_tasks: drain.completed,
            });
        }
        if drain.panicked > 0 {
            eprintln!(
                "[HWL-POOL] {} of {} combined task(s) panicked",
                drain.panicked, drain.completed
            );
        }

        if cancelled {
            let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
            self.emit(ActivityEvent::StressCancelled {
                kind: LoadKind::Combined.computation_type(),
                completed_tasks: drain.completed,
                duration_ms,
            });
            return Err(HwlError::Cancelled {
                component: LoadKind::Combined.computation_type(),
                completed_tasks: drain.completed,
            });
        }

        eprintln!(
            "[HWL-LOAD] combined_stress dispatched {cycles} cycle(s), {submitted} task(s) in {secs}s"
        );

        Ok(LoadResult {
            magnitude: secs,
            payload: LoadPayload::Combined {
                task_count: drain.completed,
                submitted,
            },
            duration,
        })
    }

    fn cycle_jobs<S>(&self, store: &Arc<S>) -> [Job; 3]
    where
        S: MetricsStore + ?Sized + 'static,
    {
        let cpu_iterations = self.config.cpu_iterations;
        let memory_mb = self.config.memory_mb;
        let database_ops = self.config.database_ops;
        let db_store = Arc::clone(store);
        let db_logger = self.logger.clone();

        [
            Box::new(move || {
                let _ = run_cpu(cpu_iterations);
            }),
            Box::new(move || {
                if let Err(e) = run_memory(memory_mb) {
                    eprintln!("[HWL-LOAD] combined memory task failed: {e}");
                }
            }),
            Box::new(move || {
                let _ = run_database(database_ops, db_store.as_ref(), db_logger.as_ref());
            }),
        ]
    }

    fn emit(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}
