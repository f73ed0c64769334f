//! CPU stressor: a bounded floating-point loop.

use std::hint::black_box;
use std::time::Instant;

use crate::load::caps;
use crate::load::result::{LoadPayload, LoadResult};

/// Every 2^19 iterations the accumulator passes through an optimization barrier.
const BARRIER_MASK: u64 = 0x7_FFFF;

/// Run `clamp(requested, 0, 7_000_000)` iterations of
/// `acc += sqrt(i) * sin(i * 1e-4)` for `i = 1..=n`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn run_cpu(requested_iterations: i64) -> LoadResult {
    let iterations = caps::CPU_ITERATIONS.clamp(requested_iterations);
    let start = Instant::now();

    let mut acc = 0.0_f64;
    for i in 1..=iterations {
        let x = i as f64;
        acc += x.sqrt() * (x * 1e-4).sin();
        if i & BARRIER_MASK == 0 {
            acc = black_box(acc);
        }
    }
    let accumulator = black_box(acc);

    LoadResult {
        magnitude: iterations,
        payload: LoadPayload::Cpu { accumulator },
        duration: start.elapsed(),
    }
}
