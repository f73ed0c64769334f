#![forbid(unsafe_code)]

//! HarborWatch-Lite (hwl): bounded synthetic load and telemetry generator.
//!
//! Two halves:
//! 1. **On-demand load**: CPU, memory, and database stressors with hard caps,
//!    plus a time-boxed combined run over a fixed worker pool
//! 2. **Recurring telemetry**: a scheduler writing four synthetic metrics per tick
//!
//! Results and metrics go through the sink traits in [`sink`]; the SQLite
//! store in [`logger::sqlite`] implements all of them.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use harborwatch_lite::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use harborwatch_lite::core::config::Config;
//! use harborwatch_lite::load::cpu::run_cpu;
//! ```

pub mod prelude;

pub mod core;
#[cfg(feature = "daemon")]
pub mod daemon;
pub mod load;
pub mod logger;
pub mod sink;
pub mod telemetry;
