//! Structured event vocabulary for logging.
//!
//! Every coordinator log line uses one of the [`event_names`] constants as
//! its tracing target and carries a `stage` field, so JSONL output can be
//! filtered without parsing messages.

use serde::{Deserialize, Serialize};

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Where in the trigger pipeline an event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup configuration loading.
    Init,
    /// Arming and disarming trigger kinds.
    Configure,
    /// Hook installation and hook callbacks.
    Hook,
    /// Waiting for the generation slot.
    Queue,
    /// Report rendering.
    Render,
    /// Hook teardown.
    Shutdown,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Configure => "configure",
            Stage::Hook => "hook",
            Stage::Queue => "queue",
            Stage::Render => "render",
            Stage::Shutdown => "shutdown",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Config
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_WARNING: &str = "config.warning";

    // Arming
    pub const TRIGGER_ARMED: &str = "trigger.armed";
    pub const TRIGGER_DISARMED: &str = "trigger.disarmed";
    pub const TRIGGER_IGNORED: &str = "trigger.ignored";
    pub const TRIGGER_FIRED: &str = "trigger.fired";

    // Hooks
    pub const HOOK_INSTALLED: &str = "hook.installed";
    pub const HOOK_REMOVED: &str = "hook.removed";
    pub const HOOK_FAILED: &str = "hook.failed";
    pub const SIGNAL_REBOUND: &str = "hook.signal_rebound";

    // Generation
    pub const REPORT_QUEUED: &str = "report.queued";
    pub const REPORT_STARTED: &str = "report.started";
    pub const REPORT_FINISHED: &str = "report.finished";
    pub const REPORT_FAILED: &str = "report.failed";
    pub const REPORT_REENTRANT: &str = "report.reentrant";
}
