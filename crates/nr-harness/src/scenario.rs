//! Scenario execution.
//!
//! A scenario spawns an instrumented child, optionally signals it, waits for
//! it to end, then checks its exit and its single report:
//!
//! 1. spawn with `NODE_REPORT_DIRECTORY` / `NODE_REPORT_COREDUMP` set
//! 2. signal scenarios: wait, deliver the signal, wait for the completion
//!    marker, then terminate
//! 3. compare the exit with the expected outcome
//! 4. locate, validate and delete the report

use crate::child::{ChildGuard, ExitOutcome};
use crate::error::{HarnessError, ValidationFailure};
use crate::locator::{find_reports_with_prefix, remove_reports};
use crate::platform::{ExitTable, ExpectedExit};
use crate::validate::{validate_report, Expectations};
use chrono::{DateTime, Utc};
use nr_common::{SignalNumber, TriggerKind, DEFAULT_PREFIX};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span};

/// Stderr line the child prints once a report is complete.
pub const COMPLETION_MARKER: &str = "Node.js report completed";

/// Inputs for one scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub name: String,
    pub kind: TriggerKind,
    /// Where the child writes reports; also its working directory.
    pub report_dir: PathBuf,
    pub core_dump: bool,
    /// Extra environment for the child.
    pub env: Vec<(String, String)>,
    pub signal_to_send: Option<SignalNumber>,
    pub delay_before_signal: Duration,
    /// How long to wait for the completion marker after signalling.
    pub grace_period: Duration,
    /// Time between `SIGTERM` and `SIGKILL`.
    pub term_grace: Duration,
    pub exit_timeout: Duration,
    pub poll_interval: Duration,
    /// Overrides the exit table.
    pub expected_exit: Option<ExpectedExit>,
    pub expected_runtime_version: Option<String>,
    pub expected_tool_version: Option<String>,
    pub report_prefix: String,
    pub keep_reports: bool,
}

impl ScenarioOptions {
    pub fn new(name: impl Into<String>, kind: TriggerKind, report_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            report_dir: report_dir.into(),
            core_dump: false,
            env: Vec::new(),
            signal_to_send: None,
            delay_before_signal: Duration::from_secs(1),
            grace_period: Duration::from_secs(10),
            term_grace: Duration::from_secs(1),
            exit_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(20),
            expected_exit: None,
            expected_runtime_version: None,
            expected_tool_version: None,
            report_prefix: DEFAULT_PREFIX.to_string(),
            keep_reports: false,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_signal(mut self, signal: SignalNumber) -> Self {
        self.signal_to_send = Some(signal);
        self
    }

    pub fn with_core_dump(mut self, on: bool) -> Self {
        self.core_dump = on;
        self
    }

    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.expected_tool_version = Some(version.into());
        self
    }

    pub fn with_expected_exit(mut self, expected: ExpectedExit) -> Self {
        self.expected_exit = Some(expected);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Passed => "passed",
            Verdict::Failed => "failed",
            Verdict::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome of one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub run_id: String,
    pub name: String,
    pub kind: TriggerKind,
    pub args: Vec<String>,
    pub pid: Option<u32>,
    pub exit: Option<ExitOutcome>,
    pub reports: Vec<PathBuf>,
    pub failures: Vec<ValidationFailure>,
    pub verdict: Verdict,
    /// Why the scenario was skipped, or the harness error that ended it.
    pub note: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ScenarioResult {
    fn new(run_id: &str, executable: &Path, args: &[String], options: &ScenarioOptions) -> Self {
        let mut argv = vec![executable.display().to_string()];
        argv.extend(args.iter().cloned());
        Self {
            run_id: run_id.to_string(),
            name: options.name.clone(),
            kind: options.kind,
            args: argv,
            pid: None,
            exit: None,
            reports: Vec::new(),
            failures: Vec::new(),
            verdict: Verdict::Passed,
            note: None,
            started_at: Utc::now(),
            elapsed_ms: 0,
        }
    }

    /// Result for a scenario the harness could not complete.
    pub fn errored(
        run_id: &str,
        executable: &Path,
        args: &[String],
        options: &ScenarioOptions,
        error: &HarnessError,
    ) -> Self {
        let mut result = Self::new(run_id, executable, args, options);
        result.verdict = Verdict::Failed;
        result.note = Some(error.to_string());
        result
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    /// Failures prefixed with the scenario name and argv.
    pub fn tagged_failures(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|failure| format!("[{} | {}] {}", self.name, self.args.join(" "), failure))
            .collect()
    }
}

/// Run one scenario against `executable`.
///
/// Returns `Err` only when the harness itself fails (spawn, signal delivery,
/// an exit deadline); assertion failures are in the result.
pub fn run_scenario(
    executable: &Path,
    args: &[String],
    options: &ScenarioOptions,
) -> Result<ScenarioResult, HarnessError> {
    run_scenario_with(executable, args, options, &ExitTable::standard(), &new_run_id())
}

pub fn new_run_id() -> String {
    format!("scn-{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}

/// [`run_scenario`] with an explicit exit table and run id.
pub fn run_scenario_with(
    executable: &Path,
    args: &[String],
    options: &ScenarioOptions,
    table: &ExitTable,
    run_id: &str,
) -> Result<ScenarioResult, HarnessError> {
    let _span = info_span!("scenario", run_id, scenario = %options.name).entered();
    let started = Instant::now();
    let mut result = ScenarioResult::new(run_id, executable, args, options);

    if options.signal_to_send.is_some() && !cfg!(unix) {
        result.verdict = Verdict::Skipped;
        result.note = Some("signals are not supported on this platform".to_string());
        return Ok(result);
    }

    let mut env = vec![
        (
            "NODE_REPORT_DIRECTORY".to_string(),
            options.report_dir.display().to_string(),
        ),
        (
            "NODE_REPORT_COREDUMP".to_string(),
            if options.core_dump { "yes" } else { "no" }.to_string(),
        ),
    ];
    env.extend(options.env.iter().cloned());

    info!(kind = %options.kind, "starting scenario");
    let mut child = ChildGuard::spawn(executable, args, &env, Some(&options.report_dir))?;
    let pid = child.pid();
    result.pid = Some(pid.as_u32());

    let outcome = match options.signal_to_send {
        Some(signal) => {
            std::thread::sleep(options.delay_before_signal);
            child.send_signal(signal)?;
            let completed =
                child.wait_for_stderr(COMPLETION_MARKER, options.grace_period, options.poll_interval);
            debug!(pid = %pid, completed, "signal report wait finished");
            child.terminate(options.term_grace, options.poll_interval)?
        }
        None => child.wait_timeout(options.exit_timeout, options.poll_interval)?,
    };
    result.exit = Some(outcome.clone());

    let expected = options
        .expected_exit
        .or_else(|| table.lookup_current(options.kind, options.core_dump));
    if let Some(expected) = expected {
        if !expected.matches(&outcome) {
            result.failures.push(ValidationFailure::UnexpectedExit {
                expected: expected.to_outcome(),
                actual: outcome,
            });
        }
    }

    let reports = find_reports_with_prefix(pid, &options.report_dir, &options.report_prefix);
    match reports.as_slice() {
        [] => result.failures.push(ValidationFailure::ReportNotFound {
            pid: pid.as_u32(),
            directory: options.report_dir.clone(),
        }),
        [report] => {
            let mut expect = Expectations::new(pid).with_command_line(result.args.clone());
            expect.runtime_version = options.expected_runtime_version.clone();
            expect.tool_version = options.expected_tool_version.clone();
            result.failures.extend(validate_report(report, &expect));
        }
        many => result.failures.push(ValidationFailure::TooManyReports {
            pid: pid.as_u32(),
            count: many.len(),
        }),
    }
    result.reports = reports.clone();

    if !options.keep_reports {
        let removed = remove_reports(&reports);
        debug!(removed, "cleaned up reports");
    }

    if !result.failures.is_empty() {
        result.verdict = Verdict::Failed;
    }
    result.elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        verdict = %result.verdict,
        failures = result.failures.len(),
        "scenario finished"
    );
    Ok(result)
}

/// The four standard scenarios: argv and options for each.
pub fn standard_scenarios(report_dir: &Path, core_dump: bool) -> Vec<(Vec<String>, ScenarioOptions)> {
    let argv = |args: &[&str]| args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let mut scenarios = vec![
        (
            argv(&["api-call"]),
            ScenarioOptions::new("api-call", TriggerKind::ApiCall, report_dir),
        ),
        (
            argv(&["exception"]),
            ScenarioOptions::new("exception", TriggerKind::UncaughtException, report_dir),
        ),
        (
            argv(&["fatal-error", "--heap-limit-mb", "16"]),
            ScenarioOptions::new("fatal-error", TriggerKind::FatalResourceExhaustion, report_dir),
        ),
    ];

    #[cfg(unix)]
    let signal = ScenarioOptions::new("signal", TriggerKind::Signal, report_dir)
        .with_env("NODE_REPORT_EVENTS", "signal")
        .with_signal(SignalNumber::SIGUSR2);
    #[cfg(not(unix))]
    let signal = ScenarioOptions::new("signal", TriggerKind::Signal, report_dir)
        .with_signal(SignalNumber(0));
    scenarios.push((argv(&["loop", "--max-secs", "30"]), signal));

    scenarios
        .into_iter()
        .map(|(args, options)| (args, options.with_core_dump(core_dump)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_set_covers_every_kind() {
        let scenarios = standard_scenarios(Path::new("/tmp"), false);
        let kinds: Vec<TriggerKind> = scenarios.iter().map(|(_, o)| o.kind).collect();
        for kind in TriggerKind::ALL {
            assert!(kinds.contains(&kind), "missing {kind}");
        }
        let signal = scenarios.iter().find(|(_, o)| o.kind == TriggerKind::Signal).unwrap();
        assert!(signal.1.signal_to_send.is_some());
        assert_eq!(signal.0[0], "loop");
    }

    #[test]
    fn tagged_failures_name_the_scenario() {
        let options = ScenarioOptions::new("api-call", TriggerKind::ApiCall, "/tmp");
        let mut result = ScenarioResult::new("scn-1", Path::new("/bin/nr-child"), &["api-call".into()], &options);
        result.failures.push(ValidationFailure::FieldMissing {
            field: "Process ID".to_string(),
        });
        assert_eq!(
            result.tagged_failures(),
            vec!["[api-call | /bin/nr-child api-call] Process ID line is missing"]
        );
    }

    #[test]
    fn scenario_events_carry_the_run_id() {
        use nr_core::logging::JsonlLayer;
        use std::io::Write;
        use std::sync::{Arc, Mutex};
        use tracing_subscriber::layer::SubscriberExt;

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl Write for Captured {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().write(buf)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(JsonlLayer::new(captured.clone()));
        let dir = tempfile::TempDir::new().unwrap();
        let options = ScenarioOptions::new("api-call", TriggerKind::ApiCall, dir.path());
        let missing = dir.path().join("no-such-child");
        tracing::subscriber::with_default(subscriber, || {
            let outcome = run_scenario_with(
                &missing,
                &["api-call".to_string()],
                &options,
                &ExitTable::standard(),
                "scn-span",
            );
            assert!(outcome.is_err());
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let started: serde_json::Value = output
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .find(|line| line["message"] == "starting scenario")
            .expect("start event");
        assert_eq!(started["run_id"], "scn-span");
        assert_eq!(started["fields"]["kind"], "apicall");
    }

    #[test]
    fn run_ids_are_distinct() {
        let a = new_run_id();
        assert!(a.starts_with("scn-"));
        assert_ne!(a, new_run_id());
    }

    #[cfg(unix)]
    #[test]
    fn missing_report_and_exit_are_both_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = ScenarioOptions::new("shell", TriggerKind::ApiCall, dir.path());
        let result = run_scenario(
            Path::new("/bin/sh"),
            &["-c".to_string(), "exit 4".to_string()],
            &options,
        )
        .unwrap();
        assert_eq!(result.verdict, Verdict::Failed);
        assert_eq!(result.exit, Some(ExitOutcome::AbnormalExit(4)));
        assert!(matches!(
            result.failures.as_slice(),
            [
                ValidationFailure::UnexpectedExit { .. },
                ValidationFailure::ReportNotFound { .. }
            ]
        ));
    }
}
