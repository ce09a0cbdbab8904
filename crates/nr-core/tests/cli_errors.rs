//! CLI error handling tests for nr-child.
//!
//! Invalid arguments and configuration must produce the documented exit
//! codes and a message on stderr.

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a Command for the nr-child binary with a clean report environment.
fn nr_child() -> Command {
    let mut cmd = Command::cargo_bin("nr-child").expect("nr-child binary should exist");
    for var in nr_core::config::vars::ALL {
        cmd.env_remove(var);
    }
    cmd.env_remove("NR_LOG").env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// Argument errors
// ============================================================================

mod arguments {
    use super::*;

    #[test]
    fn missing_subcommand_is_an_args_error() {
        nr_child()
            .assert()
            .code(10)
            .stderr(predicate::str::contains("Usage"));
    }

    #[test]
    fn unknown_subcommand_fails() {
        nr_child()
            .arg("nonexistent")
            .assert()
            .code(10)
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn help_succeeds() {
        nr_child()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("api-call"));
    }
}

// ============================================================================
// Configuration errors
// ============================================================================

mod configuration {
    use super::*;

    #[test]
    fn bad_events_flag_is_a_config_error() {
        nr_child()
            .args(["--events", "apicall+bogus", "api-call"])
            .assert()
            .code(11)
            .stderr(predicate::str::contains("unrecognised trigger token: \"bogus\""));
    }

    #[test]
    fn bad_events_variable_is_a_config_error() {
        nr_child()
            .env("NODE_REPORT_EVENTS", "nonsense")
            .arg("api-call")
            .assert()
            .code(11);
    }

    #[test]
    fn disarmed_api_call_is_refused() {
        nr_child()
            .env("NODE_REPORT_EVENTS", "exception")
            .arg("api-call")
            .assert()
            .code(13)
            .stderr(predicate::str::contains("trigger apicall is not armed"));
    }

    #[test]
    fn scenario_override_of_events_variable_warns() {
        let dir = tempfile::TempDir::new().unwrap();
        nr_child()
            .env("NODE_REPORT_EVENTS", "apicall")
            .env("NODE_REPORT_COREDUMP", "no")
            .env("NODE_REPORT_DIRECTORY", dir.path())
            .arg("exception")
            .assert()
            .code(101)
            .stderr(predicate::str::contains("NODE_REPORT_EVENTS overridden"));
    }

    #[test]
    fn scenario_without_events_variable_does_not_warn() {
        let dir = tempfile::TempDir::new().unwrap();
        nr_child()
            .env("NODE_REPORT_COREDUMP", "no")
            .env("NODE_REPORT_DIRECTORY", dir.path())
            .arg("exception")
            .assert()
            .code(101)
            .stderr(predicate::str::contains("overridden").not());
    }

    #[test]
    fn malformed_optional_variable_only_warns() {
        nr_child()
            .env("NODE_REPORT_VERBOSE", "perhaps")
            .args(["api-call", "--filename", "stdout"])
            .assert()
            .success()
            .stderr(predicate::str::contains("NODE_REPORT_VERBOSE"));
    }
}

// ============================================================================
// Stream destinations
// ============================================================================

mod streams {
    use super::*;

    #[test]
    fn stdout_report_has_all_sections() {
        let assert = nr_child()
            .args(["api-call", "--filename", "stdout"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Node.js report completed"))
            .stderr(predicate::str::contains("Writing Node.js report to file").not());
        let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
        for title in ["NodeReport", "JavaScript Stack Trace", "JavaScript Heap", "System Information"] {
            assert_eq!(nr_harness::count_sections(&stdout, title), 1, "{title}");
        }
        assert!(stdout.contains("Event: JavaScript API, location: \"TriggerReport\""));
        assert!(stdout.contains("Filename: stdout"));
    }
}
