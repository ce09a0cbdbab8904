//! Uncaught exception hook.
//!
//! Installed as the process panic hook. Every panic counts as uncaught: the
//! hook cannot see whether an enclosing `catch_unwind` will recover it.
//!
//! After the report the hook either aborts (core dump on) or hands the panic
//! to the hook it replaced, so the usual panic message still appears.

use super::{HookError, TriggerHook};
use crate::dispatch::Dispatcher;
use crate::logging::{event_names, Stage};
use crate::report::ReportRequest;
use nr_common::TriggerKind;
use std::any::Any;
use std::fmt;
use std::panic::{self, PanicHookInfo};
use std::sync::{Arc, Weak};

/// Location recorded when the panic carries none.
pub const DEFAULT_LOCATION: &str = "OnUncaughtException";

type PanicHookFn = dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static;

/// A runtime-level exception carried as a panic payload.
///
/// Raise with `std::panic::panic_any(RuntimeException::new(..))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeException {
    pub name: String,
    pub message: String,
}

impl RuntimeException {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RuntimeException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for RuntimeException {}

/// Text for a panic payload.
pub fn describe_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(exception) = payload.downcast_ref::<RuntimeException>() {
        exception.to_string()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub struct PanicHook {
    dispatcher: Weak<Dispatcher>,
    /// The hook replaced at install; `Some` while installed.
    previous: Option<Arc<PanicHookFn>>,
}

impl PanicHook {
    pub(crate) fn new(dispatcher: Weak<Dispatcher>) -> Self {
        Self {
            dispatcher,
            previous: None,
        }
    }
}

/// Report one panic. Returns whether the process should abort.
fn report_panic(dispatcher: &Weak<Dispatcher>, info: &PanicHookInfo<'_>) -> bool {
    let Some(dispatcher) = dispatcher.upgrade() else {
        return false;
    };
    if !dispatcher.is_armed(TriggerKind::UncaughtException) {
        return false;
    }

    let location = info
        .location()
        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
        .unwrap_or_else(|| DEFAULT_LOCATION.to_string());
    let request = ReportRequest::new(
        TriggerKind::UncaughtException,
        describe_payload(info.payload()),
        location,
    );
    // Failures are logged by the dispatcher.
    let _ = dispatcher.generate(request);
    dispatcher.core_dump()
}

impl TriggerHook for PanicHook {
    fn kind(&self) -> TriggerKind {
        TriggerKind::UncaughtException
    }

    fn install(&mut self) -> Result<(), HookError> {
        if self.previous.is_some() {
            return Ok(());
        }
        if std::thread::panicking() {
            return Err(HookError::Os {
                operation: "set_hook",
                errno: 0,
                message: "cannot replace the panic hook while panicking".to_string(),
            });
        }

        let previous: Arc<PanicHookFn> = Arc::from(panic::take_hook());
        let chained = Arc::clone(&previous);
        let dispatcher = self.dispatcher.clone();
        panic::set_hook(Box::new(move |info| {
            let abort = report_panic(&dispatcher, info);
            chained(info);
            if abort {
                std::process::abort();
            }
        }));
        self.previous = Some(previous);

        tracing::debug!(
            target: event_names::HOOK_INSTALLED,
            stage = %Stage::Configure,
            kind = %TriggerKind::UncaughtException,
            "panic hook installed"
        );
        Ok(())
    }

    fn uninstall(&mut self) -> Result<(), HookError> {
        if std::thread::panicking() {
            return Err(HookError::Os {
                operation: "set_hook",
                errno: 0,
                message: "cannot restore the panic hook while panicking".to_string(),
            });
        }
        let Some(previous) = self.previous.take() else {
            return Ok(());
        };

        // Restores the hook seen at install time, dropping any hook set since.
        drop(panic::take_hook());
        panic::set_hook(Box::new(move |info| previous(info)));

        tracing::debug!(
            target: event_names::HOOK_REMOVED,
            stage = %Stage::Configure,
            kind = %TriggerKind::UncaughtException,
            "panic hook removed"
        );
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.previous.is_some()
    }
}
