//! Validation harness for diagnostic reports.
//!
//! - [`locator`]: find the report files a process wrote
//! - [`sections`]: split report text into its named sections
//! - [`validate`]: content checks against an expected process
//! - [`child`]: spawn, signal and reap instrumented children
//! - [`platform`]: expected exit per trigger kind and platform
//! - [`scenario`]: end-to-end scenario runs

pub mod child;
pub mod error;
pub mod locator;
pub mod platform;
pub mod scenario;
pub mod sections;
pub mod validate;

pub use child::{ChildGuard, ExitOutcome};
pub use error::{HarnessError, ValidationFailure};
pub use locator::{find_reports, find_reports_with_prefix, remove_reports};
pub use platform::{ExitTable, ExpectedExit};
pub use scenario::{run_scenario, ScenarioOptions, ScenarioResult, Verdict};
pub use sections::{count_sections, extract_section, ReportDocument};
pub use validate::{validate_document, validate_report, Expectations};

use nr_common::ExitCode;

impl HarnessError {
    /// Exit code a binary should use for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            HarnessError::SpawnFailed { .. } | HarnessError::Io(_) => ExitCode::IoError,
            HarnessError::ChildTimeout { .. } => ExitCode::TimeoutError,
            HarnessError::Signal { .. } => ExitCode::InternalError,
        }
    }
}
