//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{HwlError, Result};
use crate::load::caps;

/// Full HarborWatch-Lite configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub combined: CombinedConfig,
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
    pub paths: PathsConfig,
}

/// Combined stress orchestrator knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CombinedConfig {
    /// Fixed worker pool size.
    pub workers: usize,
    /// Bounded queue capacity between the dispatch loop and the workers.
    pub queue_capacity: usize,
    /// Pause between dispatch cycles.
    pub dispatch_quantum_ms: u64,
    /// How long the drain waits for queued and in-flight tasks.
    pub drain_grace_secs: u64,
    /// Per-task magnitudes, still clamped by the stressor caps.
    pub cpu_iterations: i64,
    pub memory_mb: i64,
    pub database_ops: i64,
}

/// Telemetry scheduler cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub period_ms: u64,
}

/// Retention for rows the daemon accumulates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Telemetry rows older than this are pruned; 0 keeps everything.
    pub retention_days: u64,
    pub prune_interval_secs: u64,
}

/// Filesystem paths used by hwl.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub sqlite_db: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for CombinedConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            dispatch_quantum_ms: 250,
            drain_grace_secs: 30,
            cpu_iterations: 250_000,
            memory_mb: 10,
            database_ops: 50,
        }
    }
}

impl CombinedConfig {
    #[must_use]
    pub const fn dispatch_quantum(&self) -> Duration {
        Duration::from_millis(self.dispatch_quantum_ms)
    }

    #[must_use]
    pub const fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 3_000,
            period_ms: 5_000,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            retention_days: 0,
            prune_interval_secs: 3_600,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[HWL-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("hwl").join("config.toml");
        let data = home_dir.join(".local").join("share").join("hwl");
        Self {
            config_file: cfg,
            sqlite_db: data.join("harborwatch.sqlite3"),
            jsonl_log: data.join("activity.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| HwlError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(HwlError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the activity log.
    ///
    /// FNV-1a keeps the value stable across processes and toolchains.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // combined
        set_usize(
            &mut lookup,
            "HWL_COMBINED_WORKERS",
            &mut self.combined.workers,
        )?;
        set_usize(
            &mut lookup,
            "HWL_COMBINED_QUEUE_CAPACITY",
            &mut self.combined.queue_capacity,
        )?;
        set_u64(
            &mut lookup,
            "HWL_COMBINED_DISPATCH_QUANTUM_MS",
            &mut self.combined.dispatch_quantum_ms,
        )?;
        set_u64(
            &mut lookup,
            "HWL_COMBINED_DRAIN_GRACE_SECS",
            &mut self.combined.drain_grace_secs,
        )?;
        set_i64(
            &mut lookup,
            "HWL_COMBINED_CPU_ITERATIONS",
            &mut self.combined.cpu_iterations,
        )?;
        set_i64(
            &mut lookup,
            "HWL_COMBINED_MEMORY_MB",
            &mut self.combined.memory_mb,
        )?;
        set_i64(
            &mut lookup,
            "HWL_COMBINED_DATABASE_OPS",
            &mut self.combined.database_ops,
        )?;

        // scheduler
        set_bool(
            &mut lookup,
            "HWL_SCHEDULER_ENABLED",
            &mut self.scheduler.enabled,
        )?;
        set_u64(
            &mut lookup,
            "HWL_SCHEDULER_INITIAL_DELAY_MS",
            &mut self.scheduler.initial_delay_ms,
        )?;
        set_u64(
            &mut lookup,
            "HWL_SCHEDULER_PERIOD_MS",
            &mut self.scheduler.period_ms,
        )?;

        // storage
        set_u64(
            &mut lookup,
            "HWL_STORAGE_RETENTION_DAYS",
            &mut self.storage.retention_days,
        )?;
        set_u64(
            &mut lookup,
            "HWL_STORAGE_PRUNE_INTERVAL_SECS",
            &mut self.storage.prune_interval_secs,
        )?;

        // paths
        if let Some(raw) = lookup("HWL_PATHS_SQLITE_DB") {
            self.paths.sqlite_db = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("HWL_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Reject values the load engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let combined = &self.combined;
        if combined.workers == 0 {
            return Err(HwlError::InvalidConfig {
                details: "combined.workers must be >= 1".to_string(),
            });
        }
        if combined.queue_capacity == 0 {
            return Err(HwlError::InvalidConfig {
                details: "combined.queue_capacity must be >= 1".to_string(),
            });
        }
        if combined.dispatch_quantum_ms == 0 {
            return Err(HwlError::InvalidConfig {
                details: "combined.dispatch_quantum_ms must be >= 1".to_string(),
            });
        }

        for (name, value, range) in [
            (
                "cpu_iterations",
                combined.cpu_iterations,
                caps::CPU_ITERATIONS,
            ),
            ("memory_mb", combined.memory_mb, caps::MEMORY_MB),
            ("database_ops", combined.database_ops, caps::DATABASE_OPS),
        ] {
            if !range.contains(value) {
                return Err(HwlError::InvalidConfig {
                    details: format!(
                        "combined.{name} must be in [{}, {}], got {value}",
                        range.floor, range.ceiling
                    ),
                });
            }
        }

        if self.scheduler.period_ms == 0 {
            return Err(HwlError::InvalidConfig {
                details: "scheduler.period_ms must be >= 1".to_string(),
            });
        }

        if self.storage.prune_interval_secs == 0 {
            return Err(HwlError::InvalidConfig {
                details: "storage.prune_interval_secs must be >= 1".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| HwlError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn set_u64<F>(lookup: &mut F, name: &str, slot: &mut u64) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}

fn set_i64<F>(lookup: &mut F, name: &str, slot: &mut i64) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}

fn set_usize<F>(lookup: &mut F, name: &str, slot: &mut usize) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}

fn set_bool<F>(lookup: &mut F, name: &str, slot: &mut bool) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}
