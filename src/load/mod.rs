//! On-demand load generation: three bounded stressors, a combined
//! orchestrator over a worker pool, and the controller that records results.

pub mod caps;
pub mod combined;
pub mod controller;
pub mod cpu;
pub mod database;
pub mod memory;
pub mod pool;
pub mod result;
