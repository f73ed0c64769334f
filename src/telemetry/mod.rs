//! Periodic synthetic telemetry written to a metrics sink.

pub mod sample;
pub mod scheduler;
