//! Report configuration loading.
//!
//! This module handles:
//! - Reading the `NODE_REPORT_*` variables once at startup
//! - Parsing each value with the option parsers in [`options`]
//! - Collecting non-fatal problems as [`ConfigWarning`]s
//!
//! A malformed trigger specification is the only hard error; every other
//! malformed value falls back to its default and produces a warning.

pub mod options;

use nr_common::{parse_trigger_spec, ConfigError, SignalNumber, TriggerSpec};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

pub use options::{default_signal, MAX_DIRECTORY_LEN, MAX_FILENAME_LEN};

/// Environment variable names.
pub mod vars {
    pub const EVENTS: &str = "NODE_REPORT_EVENTS";
    pub const SIGNAL: &str = "NODE_REPORT_SIGNAL";
    pub const COREDUMP: &str = "NODE_REPORT_COREDUMP";
    pub const FILENAME: &str = "NODE_REPORT_FILENAME";
    pub const DIRECTORY: &str = "NODE_REPORT_DIRECTORY";
    pub const VERBOSE: &str = "NODE_REPORT_VERBOSE";

    pub const ALL: [&str; 6] = [EVENTS, SIGNAL, COREDUMP, FILENAME, DIRECTORY, VERBOSE];
}

/// Immutable report configuration consumed by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportConfig {
    /// Trigger kinds to arm at start.
    pub events: TriggerSpec,
    /// Signal bound for the signal trigger.
    pub signal: SignalNumber,
    /// Abort (core dump) rather than exit/continue after fatal reports.
    pub core_dump: bool,
    /// Fixed report filename; `stdout`/`stderr` select a stream.
    pub filename: Option<String>,
    /// Output directory joined onto report filenames.
    pub directory: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            events: TriggerSpec::all(),
            signal: default_signal(),
            core_dump: true,
            filename: None,
            directory: None,
            verbose: false,
        }
    }
}

/// A malformed optional variable that was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub variable: &'static str,
    pub error: ConfigError,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.variable, self.error)
    }
}

/// Result of a successful load.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ReportConfig,
    pub warnings: Vec<ConfigWarning>,
}

impl ReportConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<LoadedConfig, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<LoadedConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ReportConfig::default();
        let mut warnings = Vec::new();

        config.events = parse_trigger_spec(lookup(vars::EVENTS).as_deref())?;

        if let Some(value) = lookup(vars::SIGNAL) {
            match options::parse_report_signal(&value) {
                Ok(signal) => config.signal = signal,
                Err(error) => warnings.push(ConfigWarning {
                    variable: vars::SIGNAL,
                    error,
                }),
            }
        }

        if let Some(value) = lookup(vars::COREDUMP) {
            match options::parse_switch("coredump", &value) {
                Ok(on) => config.core_dump = on,
                Err(error) => warnings.push(ConfigWarning {
                    variable: vars::COREDUMP,
                    error,
                }),
            }
        }

        if let Some(value) = lookup(vars::FILENAME) {
            match options::parse_filename(&value) {
                Ok(name) => config.filename = Some(name),
                Err(error) => warnings.push(ConfigWarning {
                    variable: vars::FILENAME,
                    error,
                }),
            }
        }

        if let Some(value) = lookup(vars::DIRECTORY) {
            match options::parse_directory(&value) {
                Ok(dir) => config.directory = Some(PathBuf::from(dir)),
                Err(error) => warnings.push(ConfigWarning {
                    variable: vars::DIRECTORY,
                    error,
                }),
            }
        }

        if let Some(value) = lookup(vars::VERBOSE) {
            match options::parse_switch("verbose", &value) {
                Ok(on) => config.verbose = on,
                Err(error) => warnings.push(ConfigWarning {
                    variable: vars::VERBOSE,
                    error,
                }),
            }
        }

        Ok(LoadedConfig { config, warnings })
    }
}

impl LoadedConfig {
    /// Emit each warning through tracing and return the config.
    pub fn log_warnings(self) -> ReportConfig {
        use crate::logging::{event_names, Stage};

        for warning in &self.warnings {
            tracing::warn!(
                target: event_names::CONFIG_WARNING,
                stage = %Stage::Init,
                variable = warning.variable,
                code = warning.error.code(),
                "{}",
                warning
            );
        }
        tracing::debug!(
            target: event_names::CONFIG_LOADED,
            stage = %Stage::Init,
            events = %self.config.events,
            signal = %self.config.signal,
            core_dump = self.config.core_dump,
            verbose = self.config.verbose,
            "report configuration loaded"
        );
        self.config
    }
}
