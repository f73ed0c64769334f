//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use harborwatch_lite::prelude::*;
//! ```

// Core
pub use crate::core::cancel::CancelToken;
pub use crate::core::config::Config;
pub use crate::core::errors::{HwlError, Result};

// Load
pub use crate::load::combined::CombinedStress;
pub use crate::load::controller::LoadController;
pub use crate::load::result::{LoadKind, LoadPayload, LoadResult};

// Sinks
pub use crate::sink::memory::MemorySink;
pub use crate::sink::{MetricsSink, MetricsStore, ResultRecord, ResultSink};
#[cfg(feature = "sqlite")]
pub use crate::logger::sqlite::SqliteStore;

// Telemetry
pub use crate::telemetry::sample::{MetricBatch, MetricName, MetricSample};
pub use crate::telemetry::scheduler::{SchedulerState, TelemetryScheduler};
