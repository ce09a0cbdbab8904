//! Fatal resource exhaustion hook.
//!
//! The host runtime reports fatal conditions by calling
//! `Coordinator::on_fatal_error`; this hook only records whether that path
//! should produce a report.

use super::{HookError, TriggerHook};
use nr_common::TriggerKind;

#[derive(Debug, Default)]
pub struct FatalErrorHook {
    installed: bool,
}

impl FatalErrorHook {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TriggerHook for FatalErrorHook {
    fn kind(&self) -> TriggerKind {
        TriggerKind::FatalResourceExhaustion
    }

    fn install(&mut self) -> Result<(), HookError> {
        self.installed = true;
        Ok(())
    }

    fn uninstall(&mut self) -> Result<(), HookError> {
        self.installed = false;
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.installed
    }
}
