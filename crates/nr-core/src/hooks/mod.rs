//! Per-kind trigger hooks.
//!
//! Each armable kind that needs an OS or runtime subscription owns one hook:
//!
//! | Kind | Hook |
//! |------|------|
//! | `exception` | [`PanicHook`], a process panic hook |
//! | `fatalerror` | [`FatalErrorHook`], consulted by `Coordinator::on_fatal_error` |
//! | `signal` | [`SignalHook`], a `sigaction` handler plus watchdog thread |
//! | `apicall` | none |
//!
//! Hooks hold a weak handle to the coordinator's dispatcher, so an installed
//! hook never keeps a dropped coordinator alive.

pub mod exception;
pub mod fatal;
pub mod signal;

pub use exception::{PanicHook, RuntimeException};
pub use fatal::FatalErrorHook;
pub use signal::SignalHook;

use nr_common::{SignalNumber, TriggerKind};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Hook installation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("signal {0} cannot be caught")]
    InvalidSignal(SignalNumber),

    #[error("a report signal handler is already bound to {0}")]
    AlreadyBound(SignalNumber),

    #[error("{operation} failed: {message} (errno {errno})")]
    Os {
        operation: &'static str,
        errno: i32,
        message: String,
    },

    #[error("{0} hooks are not supported on this platform")]
    Unsupported(TriggerKind),
}

impl HookError {
    /// Capture `errno` after a failed libc call.
    pub(crate) fn last_os_error(operation: &'static str) -> Self {
        let err = std::io::Error::last_os_error();
        HookError::Os {
            operation,
            errno: err.raw_os_error().unwrap_or(0),
            message: err.to_string(),
        }
    }
}

/// A removable subscription for one trigger kind.
pub trait TriggerHook: Send {
    fn kind(&self) -> TriggerKind;

    /// Install the hook. Installing an installed hook is a no-op.
    fn install(&mut self) -> Result<(), HookError>;

    /// Remove the hook. Removing a hook that was never installed is a no-op.
    fn uninstall(&mut self) -> Result<(), HookError>;

    fn is_installed(&self) -> bool;
}

/// Installation state reported by `Coordinator::hook_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStatus {
    Installed,
    NotInstalled,
    /// The kind has no hook (`apicall`).
    NotRequired,
}

impl fmt::Display for HookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookStatus::Installed => "installed",
            HookStatus::NotInstalled => "not installed",
            HookStatus::NotRequired => "not required",
        };
        f.write_str(s)
    }
}
