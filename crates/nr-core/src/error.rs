//! Error types for the trigger coordinator.

use crate::hooks::HookError;
use crate::render::RenderError;
use nr_common::{ConfigError, TriggerKind};
use thiserror::Error;

/// Errors raised while producing one report.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The calling thread already holds the generation slot.
    #[error("report generation re-entered on the generating thread")]
    Reentrant,

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Errors surfaced by coordinator operations.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("trigger {0} is not armed")]
    Disarmed(TriggerKind),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl CoordinatorError {
    /// Exit code a binary should use for this error.
    pub fn exit_code(&self) -> nr_common::ExitCode {
        use nr_common::ExitCode;
        match self {
            CoordinatorError::Disarmed(_) => ExitCode::Disarmed,
            CoordinatorError::Config(_) => ExitCode::ConfigError,
            CoordinatorError::Hook(_) => ExitCode::HookError,
            CoordinatorError::Generation(GenerationError::Reentrant) => ExitCode::InternalError,
            CoordinatorError::Generation(GenerationError::Render(_)) => ExitCode::IoError,
        }
    }
}
