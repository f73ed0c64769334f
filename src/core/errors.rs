//! HWL-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, HwlError>;

/// Top-level error type for HarborWatch-Lite.
#[derive(Debug, Error)]
pub enum HwlError {
    #[error("[HWL-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[HWL-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[HWL-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[HWL-2001] sink write failure in {sink}: {details}")]
    Sink { sink: &'static str, details: String },

    #[error("[HWL-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[HWL-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error(
        "[HWL-2201] worker pool drain exceeded {grace_secs}s grace with {outstanding} worker(s) busy"
    )]
    DrainTimeout { outstanding: usize, grace_secs: u64 },

    #[error("[HWL-2202] {component} cancelled after {completed_tasks} completed task(s)")]
    Cancelled {
        component: &'static str,
        completed_tasks: u64,
    },

    #[error("[HWL-2203] invalid lifecycle transition in {component}: {details}")]
    Lifecycle {
        component: &'static str,
        details: String,
    },

    #[error("[HWL-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[HWL-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl HwlError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "HWL-1001",
            Self::MissingConfig { .. } => "HWL-1002",
            Self::ConfigParse { .. } => "HWL-1003",
            Self::Sink { .. } => "HWL-2001",
            Self::Serialization { .. } => "HWL-2101",
            Self::Sql { .. } => "HWL-2102",
            Self::DrainTimeout { .. } => "HWL-2201",
            Self::Cancelled { .. } => "HWL-2202",
            Self::Lifecycle { .. } => "HWL-2203",
            Self::Io { .. } => "HWL-3002",
            Self::Runtime { .. } => "HWL-3900",
        }
    }

    /// Whether the failure came from a metrics or result sink.
    ///
    /// Sink failures are swallowed inside the database stressor loop and
    /// inside scheduler ticks, and propagated everywhere else.
    #[must_use]
    pub const fn is_sink_failure(&self) -> bool {
        matches!(self, Self::Sink { .. } | Self::Sql { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for HwlError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for HwlError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for HwlError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_variant() -> Vec<HwlError> {
        vec![
            HwlError::InvalidConfig {
                details: String::new(),
            },
            HwlError::MissingConfig {
                path: PathBuf::new(),
            },
            HwlError::ConfigParse {
                context: "",
                details: String::new(),
            },
            HwlError::Sink {
                sink: "",
                details: String::new(),
            },
            HwlError::Serialization {
                context: "",
                details: String::new(),
            },
            HwlError::Sql {
                context: "",
                details: String::new(),
            },
            HwlError::DrainTimeout {
                outstanding: 0,
                grace_secs: 0,
            },
            HwlError::Cancelled {
                component: "",
                completed_tasks: 0,
            },
            HwlError::Lifecycle {
                component: "",
                details: String::new(),
            },
            HwlError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            HwlError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = every_variant();
        let codes: Vec<&str> = errors.iter().map(HwlError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_embeds_code_for_every_variant() {
        for err in every_variant() {
            let code = err.code();
            assert!(code.starts_with("HWL-"), "code {code} must start with HWL-");
            assert!(
                err.to_string().contains(code),
                "display should contain {code}: {err}"
            );
        }
    }

    #[test]
    fn sink_failures_are_classified() {
        assert!(
            HwlError::Sink {
                sink: "memory",
                details: "boom".to_string()
            }
            .is_sink_failure()
        );
        assert!(
            HwlError::Sql {
                context: "insert",
                details: String::new()
            }
            .is_sink_failure()
        );
        assert!(
            !HwlError::Cancelled {
                component: "combined",
                completed_tasks: 3
            }
            .is_sink_failure()
        );
        assert!(
            !HwlError::DrainTimeout {
                outstanding: 1,
                grace_secs: 30
            }
            .is_sink_failure()
        );
    }

    #[test]
    fn cancelled_reports_completed_tasks() {
        let err = HwlError::Cancelled {
            component: "combined stress",
            completed_tasks: 42,
        };
        assert_eq!(err.code(), "HWL-2202");
        assert!(err.to_string().contains("42 completed task(s)"));
    }

    #[test]
    fn io_convenience_constructor() {
        let err = HwlError::io(
            "/tmp/test.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "HWL-3002");
        assert!(err.to_string().contains("/tmp/test.txt"));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn from_rusqlite_error() {
        let sql_err =
            rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(1), Some("test".to_string()));
        let err: HwlError = sql_err.into();
        assert_eq!(err.code(), "HWL-2102");
        assert!(err.is_sink_failure());
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: HwlError = json_err.into();
        assert_eq!(err.code(), "HWL-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: HwlError = toml_err.into();
        assert_eq!(err.code(), "HWL-1003");
    }
}
