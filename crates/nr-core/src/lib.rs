//! Diagnostic report triggers.
//!
//! This crate decides *when* a diagnostic report is produced and routes the
//! request to a renderer:
//! - [`config`]: one-shot `NODE_REPORT_*` configuration loading
//! - [`Coordinator`]: armed trigger kinds, output target, report history
//! - [`hooks`]: panic, fatal-error and signal subscriptions
//! - [`queue`]: FIFO serialization of report generation
//! - [`render`]: the renderer seam and the plain-text reference renderer
//! - [`logging`]: tracing setup shared by the binaries

pub mod config;
pub mod coordinator;
mod dispatch;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod queue;
pub mod render;
pub mod report;

pub use config::{ConfigWarning, LoadedConfig, ReportConfig};
pub use coordinator::{
    ConfigureReport, Coordinator, KindOutcome, API_LOCATION, API_MESSAGE, GET_REPORT_LOCATION,
};
pub use error::{CoordinatorError, GenerationError};
pub use hooks::{HookError, HookStatus, RuntimeException};
pub use render::{RenderError, ReportRenderer, RuntimeInspector, TextRenderer};
pub use report::{Destination, OutputTarget, ReportHandle, ReportRequest};
