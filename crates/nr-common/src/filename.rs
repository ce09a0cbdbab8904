//! Report filename grammar.
//!
//! Generated report files are named
//! `<Prefix>.<YYYYMMDD>.<HHMMSS>.<pid>.<seq>.txt`, where the timestamp is
//! local time at generation and `seq` is a per-process counter rendered with
//! at least three digits. The pid and sequence components together keep
//! names unique inside a shared output directory.

use crate::id::ProcessId;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "NodeReport";

/// Extension of every generated report file.
pub const EXTENSION: &str = "txt";

/// Components of a generated report filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFileName {
    pub prefix: String,
    pub timestamp: NaiveDateTime,
    pub pid: ProcessId,
    pub sequence: u32,
}

impl ReportFileName {
    pub fn new(
        prefix: impl Into<String>,
        timestamp: NaiveDateTime,
        pid: ProcessId,
        sequence: u32,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            timestamp,
            pid,
            sequence,
        }
    }

    /// Render the filename (no directory component).
    pub fn render(&self) -> String {
        format!(
            "{}.{}.{}.{}.{:03}.{}",
            self.prefix,
            self.timestamp.format("%Y%m%d"),
            self.timestamp.format("%H%M%S"),
            self.pid,
            self.sequence,
            EXTENSION
        )
    }

    /// Parse a bare filename back into its components.
    ///
    /// The prefix may itself contain dots; the five trailing components are
    /// taken from the right.
    pub fn parse(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".txt")?;
        let mut parts = stem.rsplitn(5, '.');
        let sequence = parts.next()?;
        let pid = parts.next()?;
        let time = parts.next()?;
        let date = parts.next()?;
        let prefix = parts.next()?;

        if prefix.is_empty()
            || !all_digits(sequence)
            || !all_digits(pid)
            || date.len() != 8
            || !all_digits(date)
            || time.len() != 6
            || !all_digits(time)
        {
            return None;
        }

        let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
        let time = NaiveTime::parse_from_str(time, "%H%M%S").ok()?;
        Some(Self {
            prefix: prefix.to_string(),
            timestamp: NaiveDateTime::new(date, time),
            pid: ProcessId(pid.parse().ok()?),
            sequence: sequence.parse().ok()?,
        })
    }
}

impl fmt::Display for ReportFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Anchored pattern matching report files for one process.
///
/// The pid must fill its whole dot-delimited component, so pid `42` never
/// matches `...423.1.txt` or `...142.1.txt`.
pub fn report_name_pattern(prefix: &str, pid: ProcessId) -> Result<Regex, regex::Error> {
    let pattern = format!(
        r"^{}\.\d{{8}}\.\d{{6}}\.{}\.\d+\.{}$",
        regex::escape(prefix),
        pid,
        EXTENSION
    );
    Regex::new(&pattern)
}
