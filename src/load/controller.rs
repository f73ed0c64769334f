//! Entry points for on-demand load: run a stressor, record its result row,
//! and announce it on the activity log.

#![allow(missing_docs)]

use std::sync::Arc;

use crate::core::cancel::CancelToken;
use crate::core::config::CombinedConfig;
use crate::core::errors::Result;
use crate::load::combined::CombinedStress;
use crate::load::cpu::run_cpu;
use crate::load::database::run_database;
use crate::load::memory::run_memory;
use crate::load::result::LoadResult;
use crate::logger::dual::{ActivityEvent, ActivityLoggerHandle};
use crate::sink::{MetricsStore, ResultSink};

/// Iterations used when a CPU request names no magnitude.
pub const DEFAULT_CPU_ITERATIONS: i64 = 1_000_000;
/// MiB used when a memory request names no magnitude.
pub const DEFAULT_MEMORY_MB: i64 = 50;
/// Operations used when a database request names no magnitude.
pub const DEFAULT_DATABASE_OPS: i64 = 1_000;
/// Seconds used when a combined request names no duration.
pub const DEFAULT_COMBINED_SECS: i64 = 20;

/// Runs stressors against a metrics store and records each outcome.
///
/// A result row that cannot be written fails the call: the caller asked for a
/// recorded run and did not get one.
pub struct LoadController<M: ?Sized, R: ?Sized> {
    metrics: Arc<M>,
    results: Arc<R>,
    combined: CombinedStress,
    logger: Option<ActivityLoggerHandle>,
}

impl<M, R> LoadController<M, R>
where
    M: MetricsStore + ?Sized + 'static,
    R: ResultSink + ?Sized,
{
    pub fn new(
        metrics: Arc<M>,
        results: Arc<R>,
        combined: CombinedConfig,
        logger: Option<ActivityLoggerHandle>,
    ) -> Self {
        Self {
            metrics,
            results,
            combined: CombinedStress::new(combined, logger.clone()),
            logger,
        }
    }

    pub fn cpu(&self, iterations: i64) -> Result<LoadResult> {
        self.record(run_cpu(iterations))
    }

    pub fn memory(&self, size_mb: i64) -> Result<LoadResult> {
        self.record(run_memory(size_mb)?)
    }

    pub fn database(&self, ops: i64) -> Result<LoadResult> {
        let result = run_database(ops, self.metrics.as_ref(), self.logger.as_ref());
        self.record(result)
    }

    /// Runs the orchestrator; a cancelled run records nothing.
    pub fn combined(&self, duration_secs: i64, cancel: &CancelToken) -> Result<LoadResult> {
        let result = self.combined.run(duration_secs, &self.metrics, cancel)?;
        self.record(result)
    }

    fn record(&self, result: LoadResult) -> Result<LoadResult> {
        let record = result.to_record();
        self.results.append_result(&record)?;

        eprintln!(
            "[HWL-LOAD] {} done: magnitude={} {} in {}ms",
            record.computation_type, result.magnitude, record.result, record.duration_ms
        );
        if let Some(logger) = &self.logger {
            logger.send(ActivityEvent::StressCompleted {
                kind: result.kind().computation_type(),
                magnitude: result.magnitude,
                summary: record.result,
                duration_ms: record.duration_ms,
            });
        }
        Ok(result)
    }
}
