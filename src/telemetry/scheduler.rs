//! Periodic telemetry: one dedicated thread writing a four-sample batch per tick.
//!
//! Ticks never overlap. When a tick overruns the period, the missed slots are
//! skipped and counted rather than replayed back-to-back.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;

use crate::core::cancel::CancelToken;
use crate::core::config::SchedulerConfig;
use crate::core::errors::{HwlError, Result};
use crate::logger::dual::{ActivityEvent, ActivityLoggerHandle, report_sink_failure};
use crate::sink::MetricsSink;
use crate::telemetry::sample::MetricBatch;

const COMPONENT: &str = "telemetry scheduler";

/// Lifecycle: `Init -> Running -> Stopped`. A stopped scheduler is not restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Init,
    Running,
    Stopped,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub timestamp: DateTime<Utc>,
    pub written: u64,
    pub failed: u64,
    pub duration: Duration,
}

/// Running totals, readable while the scheduler thread is live.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    ticks: AtomicU64,
    samples_written: AtomicU64,
    write_failures: AtomicU64,
    ticks_skipped: AtomicU64,
}

impl SchedulerStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped.load(Ordering::Relaxed)
    }

    fn record(&self, report: &TickReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.samples_written
            .fetch_add(report.written, Ordering::Relaxed);
        self.write_failures
            .fetch_add(report.failed, Ordering::Relaxed);
    }
}

/// Capture one timestamp, draw a batch, and write its samples in order.
///
/// Each sample is a separate write. A failed write is reported and counted;
/// the remaining writes still run.
pub fn run_tick<S, R>(sink: &S, rng: &mut R, logger: Option<&ActivityLoggerHandle>) -> TickReport
where
    S: MetricsSink + ?Sized,
    R: Rng + ?Sized,
{
    let start = Instant::now();
    let timestamp = Utc::now();
    let batch = MetricBatch::generate(timestamp, rng);

    let mut written = 0_u64;
    let mut failed = 0_u64;
    for sample in batch.samples() {
        match sink.append_metric(sample.timestamp, sample.name.as_str(), sample.value) {
            Ok(()) => written += 1,
            Err(e) => {
                failed += 1;
                report_sink_failure(logger, "telemetry", sample.name.as_str(), &e);
            }
        }
    }

    TickReport {
        timestamp,
        written,
        failed,
        duration: start.elapsed(),
    }
}

/// Owns the telemetry thread and its lifecycle.
pub struct TelemetryScheduler<S: ?Sized> {
    sink: Arc<S>,
    initial_delay: Duration,
    period: Duration,
    logger: Option<ActivityLoggerHandle>,
    state: SchedulerState,
    stop: CancelToken,
    stats: Arc<SchedulerStats>,
    join: Option<JoinHandle<()>>,
}

impl<S> TelemetryScheduler<S>
where
    S: MetricsSink + ?Sized + 'static,
{
    pub fn new(
        sink: Arc<S>,
        config: &SchedulerConfig,
        logger: Option<ActivityLoggerHandle>,
    ) -> Self {
        Self {
            sink,
            initial_delay: config.initial_delay(),
            period: config.period().max(Duration::from_millis(1)),
            logger,
            state: SchedulerState::Init,
            stop: CancelToken::new(),
            stats: Arc::new(SchedulerStats::default()),
            join: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }

    /// Spawn the tick thread. Only valid from `Init`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SchedulerState::Init {
            return Err(HwlError::Lifecycle {
                component: COMPONENT,
                details: format!("cannot start from {:?}", self.state),
            });
        }

        let sink = Arc::clone(&self.sink);
        let stop = self.stop.clone();
        let stats = Arc::clone(&self.stats);
        let logger = self.logger.clone();
        let initial_delay = self.initial_delay;
        let period = self.period;

        let handle = thread::Builder::new()
            .name("hwl-telemetry".to_string())
            .spawn(move || {
                scheduler_main(
                    sink.as_ref(),
                    initial_delay,
                    period,
                    &stop,
                    &stats,
                    logger.as_ref(),
                );
            })
            .map_err(|e| HwlError::Runtime {
                details: format!("failed to spawn telemetry thread: {e}"),
            })?;

        self.join = Some(handle);
        self.state = SchedulerState::Running;
        eprintln!(
            "[HWL-SCHED] started (initial_delay={}ms, period={}ms)",
            self.initial_delay.as_millis(),
            self.period.as_millis()
        );
        Ok(())
    }

    /// Signal the thread, wait for any in-progress tick, and join it.
    ///
    /// Stopping an already-stopped scheduler is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == SchedulerState::Stopped {
            return Ok(());
        }
        self.stop.cancel();
        self.state = SchedulerState::Stopped;
        if let Some(handle) = self.join.take() {
            handle.join().map_err(|_| HwlError::Lifecycle {
                component: COMPONENT,
                details: "telemetry thread panicked".to_string(),
            })?;
        }
        eprintln!(
            "[HWL-SCHED] stopped after {} tick(s), {} skipped",
            self.stats.ticks(),
            self.stats.ticks_skipped()
        );
        Ok(())
    }
}

impl<S: ?Sized> Drop for TelemetryScheduler<S> {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

fn scheduler_main<S>(
    sink: &S,
    initial_delay: Duration,
    period: Duration,
    stop: &CancelToken,
    stats: &SchedulerStats,
    logger: Option<&ActivityLoggerHandle>,
) where
    S: MetricsSink + ?Sized,
{
    let mut rng = rand::rng();
    let mut next = Instant::now() + initial_delay;

    loop {
        let wait = next.saturating_duration_since(Instant::now());
        if stop.wait_timeout(wait) {
            break;
        }

        let report = run_tick(sink, &mut rng, logger);
        stats.record(&report);
        if let Some(logger) = logger {
            logger.send(ActivityEvent::TelemetryTick {
                timestamp: report.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                written: report.written,
                failed: report.failed,
                duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            });
        }

        next += period;
        let skipped = missed_slots(next, Instant::now(), period);
        if skipped > 0 {
            next += period.saturating_mul(u32::try_from(skipped).unwrap_or(u32::MAX));
            stats.ticks_skipped.fetch_add(skipped, Ordering::Relaxed);
            eprintln!(
                "[HWL-SCHED] tick overran the {}ms period; skipped {skipped} tick(s)",
                period.as_millis()
            );
            if let Some(logger) = logger {
                logger.send(ActivityEvent::TicksSkipped { count: skipped });
            }
        }
    }
}

/// Slots whose start time already passed by `now`, counting `next` itself.
fn missed_slots(next: Instant, now: Instant, period: Duration) -> u64 {
    if now <= next {
        return 0;
    }
    let behind = now.duration_since(next).as_nanos();
    let slots = behind / period.as_nanos().max(1) + 1;
    u64::try_from(slots).unwrap_or(u64::MAX)
}
