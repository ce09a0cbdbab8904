//! nr-autorun - run the standard report scenarios
//!
//! Runs the api-call, exception, fatal-error and signal scenarios against
//! `nr-child`, prints one row per scenario and exits non-zero if any failed.

use clap::{Parser, ValueEnum};
use nr_common::ExitCode;
use nr_core::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use nr_core::render::TOOL_VERSION;
use nr_harness::scenario::{run_scenario_with, standard_scenarios};
use nr_harness::{ExitTable, HarnessError, ScenarioResult};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// Run the standard report trigger scenarios
#[derive(Parser, Debug)]
#[command(name = "nr-autorun")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the nr-child binary (defaults to the one next to nr-autorun)
    #[arg(long, env = "NR_CHILD")]
    child: Option<PathBuf>,

    /// Directory for report files (defaults to a fresh temporary directory)
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Let fatal triggers abort with a core dump
    #[arg(long)]
    core_dump: bool,

    /// Run only these scenarios (comma-separated names)
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,

    /// Leave report files in place
    #[arg(long)]
    keep_reports: bool,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "table")]
    format: OutputFormat,

    /// Log level (overrides NR_LOG / RUST_LOG)
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Log format: human or jsonl
    #[arg(long)]
    log_format: Option<LogFormat>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            let _ = err.print();
            std::process::exit(ExitCode::ArgsError.as_i32());
        }
    };
    init_logging(&LogConfig::from_env(cli.log_level, cli.log_format));

    let exit_code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("nr-autorun: {err}");
            err.exit_code()
        }
    };
    std::process::exit(exit_code.as_i32());
}

fn default_child() -> Result<PathBuf, HarnessError> {
    let exe = std::env::current_exe()?;
    let name = format!("nr-child{}", std::env::consts::EXE_SUFFIX);
    Ok(exe.with_file_name(name))
}

fn run(cli: &Cli) -> Result<ExitCode, HarnessError> {
    let child = match &cli.child {
        Some(path) => path.clone(),
        None => default_child()?,
    };
    let run_id = generate_run_id();
    let report_dir = match &cli.report_dir {
        Some(dir) => dir.clone(),
        None => std::env::temp_dir().join(format!("nr-autorun-{run_id}")),
    };
    std::fs::create_dir_all(&report_dir)?;

    let table = ExitTable::standard();
    let mut results: Vec<ScenarioResult> = Vec::new();
    let mut first_error: Option<HarnessError> = None;

    for (args, mut options) in standard_scenarios(&report_dir, cli.core_dump) {
        if !cli.only.is_empty() && !cli.only.contains(&options.name) {
            continue;
        }
        options.keep_reports = cli.keep_reports;
        options.expected_tool_version = Some(TOOL_VERSION.to_string());

        match run_scenario_with(&child, &args, &options, &table, &run_id) {
            Ok(result) => results.push(result),
            Err(err) => {
                results.push(ScenarioResult::errored(&run_id, &child, &args, &options, &err));
                first_error.get_or_insert(err);
            }
        }
    }

    if cli.report_dir.is_none() && !cli.keep_reports {
        let _ = std::fs::remove_dir(&report_dir);
    }

    match cli.format {
        OutputFormat::Json => match serde_json::to_string_pretty(&results) {
            Ok(json) => println!("{json}"),
            Err(err) => return Err(HarnessError::Io(err.into())),
        },
        OutputFormat::Table => print_table(&results),
    }

    if let Some(err) = first_error {
        return Ok(err.exit_code());
    }
    if results.iter().any(|r| r.verdict == nr_harness::Verdict::Failed) {
        return Ok(ExitCode::ScenarioFailed);
    }
    Ok(ExitCode::Clean)
}

fn print_table(results: &[ScenarioResult]) {
    println!(
        "{:<12} {:<12} {:<8} {:<18} {:>7}",
        "SCENARIO", "KIND", "VERDICT", "EXIT", "REPORTS"
    );
    for result in results {
        let exit = result
            .exit
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<12} {:<8} {:<18} {:>7}",
            result.name,
            result.kind.to_string(),
            result.verdict.to_string(),
            exit,
            result.reports.len()
        );
        if let Some(note) = &result.note {
            println!("  note: {note}");
        }
        for failure in result.tagged_failures() {
            println!("  - {failure}");
        }
    }
}
