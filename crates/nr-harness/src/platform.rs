//! Expected child exit per trigger kind and platform.
//!
//! The table is data: each row names a trigger kind and optionally narrows
//! by OS, architecture and core-dump switch. Lookup picks the matching row
//! that narrows the most; ties go to the earlier row.

use crate::child::ExitOutcome;
use nr_common::TriggerKind;
use serde::Serialize;
use std::fmt;

/// Expected exit for one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ExpectedExit {
    Clean,
    Code(i32),
    Signal(&'static str),
}

impl ExpectedExit {
    pub fn matches(self, outcome: &ExitOutcome) -> bool {
        match (self, outcome) {
            (ExpectedExit::Clean, ExitOutcome::CleanExit) => true,
            (ExpectedExit::Code(want), ExitOutcome::AbnormalExit(got)) => want == *got,
            (ExpectedExit::Signal(want), ExitOutcome::SignaledExit(got)) => want == got,
            _ => false,
        }
    }

    pub fn to_outcome(self) -> ExitOutcome {
        match self {
            ExpectedExit::Clean => ExitOutcome::CleanExit,
            ExpectedExit::Code(code) => ExitOutcome::AbnormalExit(code),
            ExpectedExit::Signal(name) => ExitOutcome::SignaledExit(name.to_string()),
        }
    }
}

impl fmt::Display for ExpectedExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_outcome().fmt(f)
    }
}

/// One row of the exit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRule {
    pub kind: TriggerKind,
    pub os: Option<&'static str>,
    pub arch: Option<&'static str>,
    pub core_dump: Option<bool>,
    pub expected: ExpectedExit,
}

impl ExitRule {
    const fn any(kind: TriggerKind, expected: ExpectedExit) -> Self {
        Self {
            kind,
            os: None,
            arch: None,
            core_dump: None,
            expected,
        }
    }

    const fn os(mut self, os: &'static str) -> Self {
        self.os = Some(os);
        self
    }

    const fn core_dump(mut self, on: bool) -> Self {
        self.core_dump = Some(on);
        self
    }

    /// Number of narrowing fields, or `None` if the row does not apply.
    fn specificity(&self, kind: TriggerKind, os: &str, arch: &str, core_dump: bool) -> Option<u8> {
        if self.kind != kind {
            return None;
        }
        let mut score = 0;
        if let Some(want) = self.os {
            if want != os {
                return None;
            }
            score += 1;
        }
        if let Some(want) = self.arch {
            if want != arch {
                return None;
            }
            score += 1;
        }
        if let Some(want) = self.core_dump {
            if want != core_dump {
                return None;
            }
            score += 1;
        }
        Some(score)
    }
}

/// Exit status of an unwinding Rust panic in `main`.
pub const PANIC_EXIT_CODE: i32 = 101;
/// Exit status after `abort()` on Windows.
pub const WINDOWS_ABORT_CODE: i32 = 3;

const STANDARD_RULES: &[ExitRule] = &[
    ExitRule::any(TriggerKind::ApiCall, ExpectedExit::Clean),
    ExitRule::any(TriggerKind::UncaughtException, ExpectedExit::Signal("SIGABRT")).core_dump(true),
    ExitRule::any(TriggerKind::UncaughtException, ExpectedExit::Code(WINDOWS_ABORT_CODE))
        .os("windows")
        .core_dump(true),
    ExitRule::any(TriggerKind::UncaughtException, ExpectedExit::Code(PANIC_EXIT_CODE))
        .core_dump(false),
    ExitRule::any(TriggerKind::FatalResourceExhaustion, ExpectedExit::Signal("SIGABRT"))
        .core_dump(true),
    ExitRule::any(
        TriggerKind::FatalResourceExhaustion,
        ExpectedExit::Code(WINDOWS_ABORT_CODE),
    )
    .os("windows")
    .core_dump(true),
    ExitRule::any(TriggerKind::FatalResourceExhaustion, ExpectedExit::Code(1)).core_dump(false),
    // The signal scenario ends when the harness sends SIGTERM.
    ExitRule::any(TriggerKind::Signal, ExpectedExit::Signal("SIGTERM")),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitTable {
    rules: Vec<ExitRule>,
}

impl Default for ExitTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl ExitTable {
    pub fn standard() -> Self {
        Self::new(STANDARD_RULES.to_vec())
    }

    pub fn new(rules: Vec<ExitRule>) -> Self {
        Self { rules }
    }

    pub fn lookup(
        &self,
        kind: TriggerKind,
        os: &str,
        arch: &str,
        core_dump: bool,
    ) -> Option<ExpectedExit> {
        let mut best: Option<(u8, ExpectedExit)> = None;
        for rule in &self.rules {
            if let Some(score) = rule.specificity(kind, os, arch, core_dump) {
                if best.is_none_or(|(top, _)| score > top) {
                    best = Some((score, rule.expected));
                }
            }
        }
        best.map(|(_, expected)| expected)
    }

    /// Lookup for the platform this harness runs on.
    pub fn lookup_current(&self, kind: TriggerKind, core_dump: bool) -> Option<ExpectedExit> {
        self.lookup(
            kind,
            std::env::consts::OS,
            std::env::consts::ARCH,
            core_dump,
        )
    }
}
