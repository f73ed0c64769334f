//! Fixed-size worker pool fed by a bounded crossbeam queue.
//!
//! Workers pull boxed jobs until the queue is closed and empty. Each job runs
//! under `catch_unwind`, so a panicking task is counted like any other and
//! never takes its worker down.

#![allow(missing_docs)]

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use crate::core::errors::{HwlError, Result};

/// A unit of work accepted by the pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Default)]
struct PoolCounters {
    completed: AtomicU64,
    panicked: AtomicU64,
    in_flight: AtomicUsize,
}

/// Outcome of [`WorkerPool::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Jobs finished, panicked ones included.
    pub completed: u64,
    pub panicked: u64,
    /// Workers still running when the grace period ran out.
    pub outstanding_workers: usize,
    pub elapsed: Duration,
}

impl DrainReport {
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        self.outstanding_workers > 0
    }
}

/// Fixed set of worker threads sharing one bounded job queue.
pub struct WorkerPool {
    job_tx: Sender<Job>,
    done_rx: Receiver<()>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    /// Spawn `size` workers named `{name}-{index}` behind a queue of `queue_capacity`.
    pub fn start(size: usize, queue_capacity: usize, name: &str) -> Result<Self> {
        let (job_tx, job_rx) = bounded::<Job>(queue_capacity.max(1));
        let (done_tx, done_rx) = unbounded::<()>();
        let counters = Arc::new(PoolCounters::default());

        let mut workers = Vec::with_capacity(size.max(1));
        for index in 0..size.max(1) {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            let counters = Arc::clone(&counters);
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_main(&job_rx, &done_tx, &counters))
                .map_err(|e| HwlError::Runtime {
                    details: format!("failed to spawn {name} worker {index}: {e}"),
                })?;
            workers.push(handle);
        }

        Ok(Self {
            job_tx,
            done_rx,
            workers,
            counters,
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job, waiting at most `timeout` for space. Returns whether it was accepted.
    pub fn submit(&self, job: Job, timeout: Duration) -> bool {
        self.job_tx.send_timeout(job, timeout).is_ok()
    }

    /// Jobs finished so far. Never decreases.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.counters.completed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Close the queue and wait up to `grace` for queued and running jobs.
    ///
    /// Workers that miss the deadline are detached, not killed; the report
    /// carries the count of jobs finished by then.
    pub fn drain(self, grace: Duration) -> DrainReport {
        let Self {
            job_tx,
            done_rx,
            workers,
            counters,
        } = self;
        let start = Instant::now();
        drop(job_tx);

        let deadline = start + grace;
        let mut finished = 0_usize;
        while finished < workers.len() {
            if done_rx.recv_deadline(deadline).is_err() {
                break;
            }
            finished += 1;
        }

        let outstanding_workers = workers.len() - finished;
        if outstanding_workers == 0 {
            for handle in workers {
                let _ = handle.join();
            }
        }

        DrainReport {
            completed: counters.completed.load(Ordering::Acquire),
            panicked: counters.panicked.load(Ordering::Acquire),
            outstanding_workers,
            elapsed: start.elapsed(),
        }
    }
}

fn worker_main(job_rx: &Receiver<Job>, done_tx: &Sender<()>, counters: &PoolCounters) {
    for job in job_rx {
        counters.in_flight.fetch_add(1, Ordering::AcqRel);
        let outcome = catch_unwind(AssertUnwindSafe(job));
        counters.in_flight.fetch_sub(1, Ordering::AcqRel);
        if outcome.is_err() {
            counters.panicked.fetch_add(1, Ordering::AcqRel);
        }
        counters.completed.fetch_add(1, Ordering::AcqRel);
    }
    let _ = done_tx.send(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn runs_every_accepted_job() {
        let pool = WorkerPool::start(4, 8, "test-pool").unwrap();
        let hits = Arc::new(AtomicU64::new(0));
        let mut accepted = 0;
        for _ in 0..100 {
            let hits = Arc::clone(&hits);
            if pool.submit(
                Box::new(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
                Duration::from_secs(5),
            ) {
                accepted += 1;
            }
        }
        let report = pool.drain(Duration::from_secs(10));
        assert_eq!(accepted, 100);
        assert_eq!(report.completed, 100);
        assert_eq!(hits.load(Ordering::SeqCst), 100);
        assert!(!report.timed_out());
    }

    #[test]
    fn panicking_job_is_counted_and_worker_survives() {
        let pool = WorkerPool::start(1, 4, "test-panic").unwrap();
        assert!(pool.submit(Box::new(|| panic!("boom")), Duration::from_secs(1)));
        let ran_after = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran_after);
        assert!(pool.submit(
            Box::new(move || flag.store(true, Ordering::SeqCst)),
            Duration::from_secs(1),
        ));
        let report = pool.drain(Duration::from_secs(10));
        assert_eq!(report.completed, 2);
        assert_eq!(report.panicked, 1);
        assert!(ran_after.load(Ordering::SeqCst));
    }

    #[test]
    fn drain_times_out_on_slow_job() {
        let pool = WorkerPool::start(2, 4, "test-slow").unwrap();
        assert!(pool.submit(
            Box::new(|| thread::sleep(Duration::from_millis(800))),
            Duration::from_secs(1),
        ));
        // Give the worker a moment to pick the job up.
        thread::sleep(Duration::from_millis(50));
        let report = pool.drain(Duration::from_millis(50));
        assert!(report.timed_out());
        assert_eq!(report.outstanding_workers, 1);
        assert_eq!(report.completed, 0);
        assert!(report.elapsed < Duration::from_millis(700));
    }

    #[test]
    fn full_queue_rejects_after_timeout() {
        let pool = WorkerPool::start(1, 1, "test-full").unwrap();
        let gate = Arc::new(AtomicBool::new(false));
        let g = Arc::clone(&gate);
        let blocker: Job = Box::new(move || {
            while !g.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
        });
        assert!(pool.submit(blocker, Duration::from_secs(1)));
        thread::sleep(Duration::from_millis(50));
        // Worker busy, queue holds one, the third cannot fit.
        assert!(pool.submit(Box::new(|| {}), Duration::from_millis(10)));
        assert!(!pool.submit(Box::new(|| {}), Duration::from_millis(10)));
        assert_eq!(pool.in_flight(), 1);
        gate.store(true, Ordering::SeqCst);
        let report = pool.drain(Duration::from_secs(5));
        assert_eq!(report.completed, 2);
    }
}
