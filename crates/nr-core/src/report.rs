//! Report handles, requests and output target resolution.

use chrono::{DateTime, Local};
use nr_common::{ProcessId, ReportFileName, TriggerKind, DEFAULT_PREFIX};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Filename that selects the stdout stream.
pub const STDOUT_NAME: &str = "stdout";
/// Filename that selects the stderr stream.
pub const STDERR_NAME: &str = "stderr";
/// Header filename for reports returned as a string.
pub const MEMORY_NAME: &str = "string";

/// Where a report's text goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "path")]
pub enum Destination {
    File(PathBuf),
    Stdout,
    Stderr,
    /// Returned to the caller instead of written anywhere.
    Memory,
}

impl Destination {
    /// Name recorded in the report header and progress messages.
    pub fn display_name(&self) -> String {
        match self {
            Destination::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Destination::Stdout => STDOUT_NAME.to_string(),
            Destination::Stderr => STDERR_NAME.to_string(),
            Destination::Memory => MEMORY_NAME.to_string(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Destination::File(path) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::File(path) => write!(f, "{}", path.display()),
            Destination::Stdout => f.write_str(STDOUT_NAME),
            Destination::Stderr => f.write_str(STDERR_NAME),
            Destination::Memory => f.write_str(MEMORY_NAME),
        }
    }
}

/// One generated (or in-flight) report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportHandle {
    pub destination: Destination,
    pub pid: ProcessId,
    pub kind: TriggerKind,
    /// Per-process sequence number, starting at 1.
    pub sequence: u32,
    /// Event description written to the header `Event:` line.
    pub message: String,
    /// Where the event was raised.
    pub location: String,
    pub created_at: DateTime<Local>,
}

impl ReportHandle {
    /// File path for file destinations.
    pub fn path(&self) -> Option<&Path> {
        self.destination.path()
    }
}

/// An event asking for a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub kind: TriggerKind,
    pub message: String,
    pub location: String,
    /// Per-call filename; overrides the configured target.
    pub filename: Option<String>,
}

impl ReportRequest {
    pub fn new(kind: TriggerKind, message: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: location.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: Option<String>) -> Self {
        self.filename = filename.filter(|name| !name.is_empty());
        self
    }
}

/// Configured report output location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputTarget {
    pub directory: Option<PathBuf>,
    pub prefix: String,
    /// Fixed filename used for every report.
    pub filename: Option<String>,
}

impl Default for OutputTarget {
    fn default() -> Self {
        Self {
            directory: None,
            prefix: DEFAULT_PREFIX.to_string(),
            filename: None,
        }
    }
}

impl OutputTarget {
    /// Resolve the destination for one report.
    ///
    /// Precedence: per-call filename, then the fixed filename, then a
    /// generated `<prefix>.<date>.<time>.<pid>.<seq>.txt` name.
    pub fn resolve(
        &self,
        per_call: Option<&str>,
        pid: ProcessId,
        sequence: u32,
        at: &DateTime<Local>,
    ) -> Destination {
        let name = match per_call.or(self.filename.as_deref()) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => ReportFileName::new(self.prefix.clone(), at.naive_local(), pid, sequence).render(),
        };

        match name.as_str() {
            STDOUT_NAME => Destination::Stdout,
            STDERR_NAME => Destination::Stderr,
            _ => match &self.directory {
                Some(dir) => Destination::File(dir.join(name)),
                None => Destination::File(PathBuf::from(name)),
            },
        }
    }
}
