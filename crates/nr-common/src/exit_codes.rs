//! Exit codes for the `nr-child` and `nr-autorun` binaries.
//!
//! Exit code ranges:
//! - 0-9: Operational outcomes
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors
//!
//! Argument parsing errors exit with `ArgsError`; `--help` and `--version`
//! exit cleanly.

/// Exit codes shared by the report tooling binaries.
///
/// `FatalError` is the status a host runtime exits with after reporting an
/// unrecoverable error with core dumps disabled; the harness exit table
/// depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-9)
    // ========================================================================
    /// Success
    Clean = 0,

    /// Fatal runtime error handled, process exiting without a core
    FatalError = 1,

    /// One or more validation scenarios failed
    ScenarioFailed = 3,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments not caught by the parser
    ArgsError = 10,

    /// Malformed report configuration
    ConfigError = 11,

    /// A trigger hook could not be installed
    HookError = 12,

    /// Report requested for a disarmed trigger
    Disarmed = 13,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    InternalError = 20,

    IoError = 21,

    /// A bounded wait expired
    TimeoutError = 22,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean)
    }

    /// Codes 10-19.
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    /// Codes 20-29.
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::FatalError => "ERR_FATAL",
            ExitCode::ScenarioFailed => "ERR_SCENARIO",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::HookError => "ERR_HOOK",
            ExitCode::Disarmed => "ERR_DISARMED",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::TimeoutError => "ERR_TIMEOUT",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
