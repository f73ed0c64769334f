//! Synthetic telemetry samples: four named metrics drawn per tick.

#![allow(missing_docs)]

use std::ops::Range;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

/// The fixed set of metric names, in write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    CpuLoad,
    MemoryUsage,
    RequestCount,
    ErrorRate,
}

impl MetricName {
    /// Write order within one tick.
    pub const ALL: [Self; 4] = [
        Self::CpuLoad,
        Self::MemoryUsage,
        Self::RequestCount,
        Self::ErrorRate,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CpuLoad => "cpu_load",
            Self::MemoryUsage => "memory_usage",
            Self::RequestCount => "request_count",
            Self::ErrorRate => "error_rate",
        }
    }

    /// Half-open value range.
    #[must_use]
    pub const fn range(self) -> Range<f64> {
        match self {
            Self::CpuLoad => 10.0..90.0,
            Self::MemoryUsage => 5.0..65.0,
            Self::RequestCount => 100.0..600.0,
            Self::ErrorRate => 0.0..10.0,
        }
    }

    /// Draw one value. Request counts are whole numbers.
    pub fn draw<R: Rng + ?Sized>(self, rng: &mut R) -> f64 {
        match self {
            Self::RequestCount => f64::from(rng.random_range(100_u32..600)),
            other => rng.random_range(other.range()),
        }
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub name: MetricName,
    pub value: f64,
}

/// Exactly four samples sharing one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricBatch {
    pub timestamp: DateTime<Utc>,
    samples: [MetricSample; 4],
}

impl MetricBatch {
    pub fn generate<R: Rng + ?Sized>(timestamp: DateTime<Utc>, rng: &mut R) -> Self {
        let samples = MetricName::ALL.map(|name| MetricSample {
            timestamp,
            name,
            value: name.draw(rng),
        });
        Self { timestamp, samples }
    }

    #[must_use]
    pub fn samples(&self) -> &[MetricSample; 4] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn batch_has_each_name_once_in_order() {
        let ts = Utc::now();
        let batch = MetricBatch::generate(ts, &mut rand::rng());
        let names: Vec<_> = batch.samples().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["cpu_load", "memory_usage", "request_count", "error_rate"]
        );
        assert!(batch.samples().iter().all(|s| s.timestamp == ts));
    }

    #[test]
    fn values_stay_in_range_across_many_draws() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..2_000 {
            let batch = MetricBatch::generate(Utc::now(), &mut rng);
            for sample in batch.samples() {
                assert!(
                    sample.name.range().contains(&sample.value),
                    "{} out of range: {}",
                    sample.name,
                    sample.value
                );
            }
            let requests = batch.samples()[2].value;
            assert!((requests - requests.trunc()).abs() < f64::EPSILON);
        }
    }
}
