//! Report content checks.
//!
//! Every check runs; failures are collected in the order they are found.

use crate::error::ValidationFailure;
use crate::sections::{count_sections, ReportDocument};
use nr_common::{ProcessId, SectionName};
use std::fs;
use std::path::Path;

pub const PID_FIELD: &str = "Process ID";
pub const RUNTIME_VERSION_FIELD: &str = "Node.js version";
pub const TOOL_VERSION_FIELD: &str = "NodeReport version";
pub const COMMAND_LINE_FIELD: &str = "Command line";

/// What a report must say about the process that wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectations {
    pub pid: ProcessId,
    /// Exact runtime version; `None` only requires the line.
    pub runtime_version: Option<String>,
    /// Exact tool version; `None` only requires the line.
    pub tool_version: Option<String>,
    /// Spawn argv; compared after quote normalization.
    pub command_line: Option<Vec<String>>,
}

impl Expectations {
    pub fn new(pid: ProcessId) -> Self {
        Self {
            pid,
            runtime_version: None,
            tool_version: None,
            command_line: None,
        }
    }

    pub fn with_runtime_version(mut self, version: impl Into<String>) -> Self {
        self.runtime_version = Some(version.into());
        self
    }

    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = Some(version.into());
        self
    }

    pub fn with_command_line(mut self, argv: Vec<String>) -> Self {
        self.command_line = Some(argv);
        self
    }
}

/// Whitespace-split tokens with surrounding quotes removed, re-joined by
/// single spaces.
pub fn normalize_command_line(line: &str) -> String {
    line.split_whitespace()
        .map(|token| token.trim_matches(|c| c == '"' || c == '\''))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read and check one report file.
pub fn validate_report(path: &Path, expect: &Expectations) -> Vec<ValidationFailure> {
    match fs::read(path) {
        Ok(bytes) => validate_document(&String::from_utf8_lossy(&bytes), expect),
        Err(err) => vec![ValidationFailure::Unreadable {
            path: path.to_path_buf(),
            message: err.to_string(),
        }],
    }
}

/// Check report text.
pub fn validate_document(text: &str, expect: &Expectations) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();
    let doc = ReportDocument::parse(text);

    for name in SectionName::ALL {
        let count = count_sections(text, name.title());
        if count > 1 {
            failures.push(ValidationFailure::DuplicateSection {
                section: name.title().to_string(),
                count,
            });
        } else if doc.section(name).is_none() {
            failures.push(ValidationFailure::SectionMissing {
                section: name.title().to_string(),
            });
        }
    }

    if doc.section(SectionName::Header).is_none() {
        return failures;
    }

    check_field(&doc, PID_FIELD, Some(&expect.pid.to_string()), &mut failures);
    check_field(
        &doc,
        RUNTIME_VERSION_FIELD,
        expect.runtime_version.as_deref(),
        &mut failures,
    );
    check_field(
        &doc,
        TOOL_VERSION_FIELD,
        expect.tool_version.as_deref(),
        &mut failures,
    );

    if let Some(argv) = &expect.command_line {
        match doc.header_field(COMMAND_LINE_FIELD) {
            None => failures.push(ValidationFailure::FieldMissing {
                field: COMMAND_LINE_FIELD.to_string(),
            }),
            Some(actual) => {
                let expected = normalize_command_line(&argv.join(" "));
                let actual = normalize_command_line(actual);
                if expected != actual {
                    failures.push(ValidationFailure::FieldMismatch {
                        field: COMMAND_LINE_FIELD.to_string(),
                        expected,
                        actual,
                    });
                }
            }
        }
    }

    failures
}

fn check_field(
    doc: &ReportDocument,
    field: &str,
    expected: Option<&str>,
    failures: &mut Vec<ValidationFailure>,
) {
    match (doc.header_field(field), expected) {
        (None, _) => failures.push(ValidationFailure::FieldMissing {
            field: field.to_string(),
        }),
        (Some(actual), Some(expected)) if actual != expected => {
            failures.push(ValidationFailure::FieldMismatch {
                field: field.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
        _ => {}
    }
}
