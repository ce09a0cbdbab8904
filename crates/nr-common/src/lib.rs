//! Node report common types.
//!
//! This crate provides the vocabulary shared by the trigger coordinator and
//! the validation harness:
//! - Trigger kinds and the `+`-delimited trigger specification parser
//! - Signal name/number table
//! - Report filename grammar (`<Prefix>.<YYYYMMDD>.<HHMMSS>.<pid>.<seq>.txt`)
//! - Report section grammar (delimiter lines, the fixed section set)
//! - Configuration error types
//! - Exit codes shared by the binaries

pub mod error;
pub mod exit_codes;
pub mod filename;
pub mod id;
pub mod section;
pub mod signal;
pub mod trigger;

pub use error::{ConfigError, Result};
pub use exit_codes::ExitCode;
pub use filename::{report_name_pattern, ReportFileName, DEFAULT_PREFIX};
pub use id::ProcessId;
pub use section::{closing_delimiter, opening_delimiter, SectionName, DELIMITER_WIDTH};
pub use signal::SignalNumber;
pub use trigger::{parse_trigger_spec, TriggerKind, TriggerSpec};
