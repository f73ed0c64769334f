//! Property tests for stressor clamping, determinism, and telemetry batches.

use chrono::Utc;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use harborwatch_lite::load::caps::{self, CapRange};
use harborwatch_lite::load::cpu::run_cpu;
use harborwatch_lite::load::database::{READ_EVERY, run_database};
use harborwatch_lite::load::memory::run_memory;
use harborwatch_lite::load::result::LoadPayload;
use harborwatch_lite::sink::memory::MemorySink;
use harborwatch_lite::telemetry::sample::{MetricBatch, MetricName};

const ALL_CAPS: [CapRange; 4] = [
    caps::CPU_ITERATIONS,
    caps::MEMORY_MB,
    caps::DATABASE_OPS,
    caps::COMBINED_SECS,
];

fn expected_checksum(blocks: u64) -> i64 {
    (0..blocks)
        .map(|b| 256 * i64::from(b as u8 as i8))
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Clamping always lands inside the cap and is the identity inside it.
    #[test]
    fn clamp_stays_in_range(requested in any::<i64>()) {
        for cap in ALL_CAPS {
            let v = cap.clamp(requested);
            prop_assert!(cap.contains(v as i64));
            if cap.contains(requested) {
                prop_assert_eq!(v as i64, requested);
            }
        }
    }

    /// Batches carry one timestamp, each name once in order, values in range.
    #[test]
    fn telemetry_batch_is_well_formed(seed in any::<u64>()) {
        let ts = Utc::now();
        let batch = MetricBatch::generate(ts, &mut StdRng::seed_from_u64(seed));
        for (sample, name) in batch.samples().iter().zip(MetricName::ALL) {
            prop_assert_eq!(sample.name, name);
            prop_assert_eq!(sample.timestamp, ts);
            prop_assert!(name.range().contains(&sample.value));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// CPU reports the clamped iteration count and is deterministic.
    #[test]
    fn cpu_reports_clamped_iterations(requested in -1_000_i64..20_000) {
        let a = run_cpu(requested);
        let b = run_cpu(requested);
        prop_assert_eq!(a.magnitude, caps::CPU_ITERATIONS.clamp(requested));
        prop_assert_eq!(&a.payload, &b.payload);
    }

    /// Memory checksum depends only on the clamped size.
    #[test]
    fn memory_checksum_is_a_function_of_size(requested in -10_i64..24) {
        let r = run_memory(requested).unwrap();
        let blocks = caps::MEMORY_MB.clamp(requested);
        prop_assert_eq!(r.magnitude, blocks);
        prop_assert_eq!(r.payload, LoadPayload::Memory { checksum: expected_checksum(blocks) });
    }

    /// Database performs clamp(o) inserts and floor(clamp(o) / 25) reads.
    #[test]
    fn database_counts_follow_magnitude(requested in -50_i64..800) {
        let sink = MemorySink::new();
        let r = run_database(requested, &sink, None);
        let ops = caps::DATABASE_OPS.clamp(requested);
        prop_assert_eq!(r.magnitude, ops);
        prop_assert_eq!(sink.metric_count() as u64, ops);
        prop_assert_eq!(sink.read_count(), ops / READ_EVERY);
        prop_assert_eq!(r.payload, LoadPayload::Database { reads: ops / READ_EVERY, failed_ops: 0 });
    }
}
