//! Daemon subsystem: the telemetry loop and signal handling.

pub mod loop_main;
pub mod signals;
