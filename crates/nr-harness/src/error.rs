//! Harness errors and validation failures.
//!
//! [`HarnessError`] means the harness could not run a scenario at all.
//! [`ValidationFailure`] is an assertion about the child or its report that
//! did not hold; those are collected, never raised.

use crate::child::ExitOutcome;
use nr_common::SignalNumber;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("child {pid} did not exit within {timeout:?}")]
    ChildTimeout { pid: u32, timeout: Duration },

    #[error("failed to send {signal} to {pid}: {message}")]
    Signal {
        pid: u32,
        signal: SignalNumber,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One failed check, in the order it was found.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "failure", rename_all = "snake_case")]
pub enum ValidationFailure {
    #[error("no report found for pid {pid} in {directory}")]
    ReportNotFound { pid: u32, directory: PathBuf },

    #[error("expected exactly one report for pid {pid}, found {count}")]
    TooManyReports { pid: u32, count: usize },

    #[error("section {section:?} is missing")]
    SectionMissing { section: String },

    #[error("section {section:?} appears {count} times")]
    DuplicateSection { section: String, count: usize },

    #[error("{field}: expected {expected:?}, found {actual:?}")]
    FieldMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("{field} line is missing")]
    FieldMissing { field: String },

    #[error("expected {expected}, child ended with {actual}")]
    UnexpectedExit {
        expected: ExitOutcome,
        actual: ExitOutcome,
    },

    #[error("cannot read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
}
