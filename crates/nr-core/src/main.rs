//! nr-child - instrumented test program
//!
//! Each subcommand sets up a report coordinator from the `NODE_REPORT_*`
//! environment and then provokes one kind of trigger:
//! - `api-call`: request a report directly
//! - `exception`: raise an uncaught runtime exception
//! - `fatal-error`: exhaust a heap budget and report a fatal error
//! - `loop`: stay busy until signalled or the time limit passes

use clap::{Args, Parser, Subcommand};
use nr_common::{parse_trigger_spec, ExitCode, TriggerKind, TriggerSpec};
use nr_core::config::vars;
use nr_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use nr_core::{Coordinator, CoordinatorError, ReportConfig, RuntimeException, TextRenderer};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Instrumented child process for report trigger scenarios
#[derive(Parser)]
#[command(name = "nr-child")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalOpts,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Log level (overrides NR_LOG / RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format: human or jsonl
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Trigger events to arm, e.g. "exception+signal"
    #[arg(long, global = true)]
    events: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Request a report through the API and exit
    ApiCall(ApiCallArgs),
    /// Raise an uncaught runtime exception
    Exception,
    /// Allocate until the heap budget is spent, then raise a fatal error
    FatalError(FatalErrorArgs),
    /// Push, mutate and pop records until terminated
    Loop(LoopArgs),
}

#[derive(Args, Debug)]
struct ApiCallArgs {
    /// Report filename for this call (`stdout`/`stderr` select a stream)
    #[arg(long)]
    filename: Option<String>,
}

#[derive(Args, Debug)]
struct FatalErrorArgs {
    /// Heap budget in MiB
    #[arg(long, default_value = "16")]
    heap_limit_mb: usize,
}

#[derive(Args, Debug)]
struct LoopArgs {
    /// Give up after this many seconds
    #[arg(long, default_value = "30")]
    max_secs: u64,

    /// Records per batch
    #[arg(long, default_value = "1000")]
    items: usize,
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

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let exit_code = match run(cli) {
        Ok(()) => ExitCode::Clean,
        Err(err) => {
            eprintln!("nr-child: {err}");
            err.exit_code()
        }
    };
    std::process::exit(exit_code.as_i32());
}

/// Kinds a scenario arms when `--events` is not given.
fn scenario_events(command: &Command, configured: TriggerSpec) -> TriggerSpec {
    match command {
        Command::Exception => TriggerSpec::only(TriggerKind::UncaughtException),
        Command::FatalError(_) => TriggerSpec::only(TriggerKind::FatalResourceExhaustion),
        Command::ApiCall(_) | Command::Loop(_) => configured,
    }
}

fn run(cli: Cli) -> Result<(), CoordinatorError> {
    let mut config = ReportConfig::from_env()?.log_warnings();
    config.events = match cli.global.events.as_deref() {
        Some(text) => parse_trigger_spec(Some(text))?,
        None => {
            let events = scenario_events(&cli.command, config.events.clone());
            if events != config.events && std::env::var_os(vars::EVENTS).is_some() {
                tracing::warn!(
                    configured = %config.events,
                    armed = %events,
                    "{} overridden by the scenario; pass --events to choose kinds",
                    vars::EVENTS
                );
            }
            events
        }
    };

    let coordinator = Coordinator::new(config, Arc::new(TextRenderer::new()));
    let started = coordinator.start();
    if let Some((_, err)) = started.failures().next() {
        return Err(err.clone().into());
    }

    match cli.command {
        Command::ApiCall(args) => {
            let handle = coordinator.fire_now(args.filename.as_deref())?;
            tracing::info!(
                destination = %handle.destination,
                sequence = handle.sequence,
                "api report written"
            );
            Ok(())
        }
        Command::Exception => raise_exception(),
        Command::FatalError(args) => exhaust_heap(&coordinator, args.heap_limit_mb),
        Command::Loop(args) => {
            busy_loop(Duration::from_secs(args.max_secs), args.items);
            Ok(())
        }
    }
}

fn raise_exception() -> ! {
    std::panic::panic_any(RuntimeException::new(
        "UserException",
        "*** exception: testcase exception thrown from raise_exception()",
    ))
}

fn exhaust_heap(coordinator: &Coordinator, limit_mb: usize) -> ! {
    const CHUNK: usize = 1024 * 1024;
    let mut heap: Vec<Vec<u8>> = Vec::new();
    while heap.len() < limit_mb {
        let mut chunk = vec![0u8; CHUNK];
        // Touch every page so the allocation is real.
        for byte in chunk.iter_mut().step_by(4096) {
            *byte = 1;
        }
        heap.push(std::hint::black_box(chunk));
    }
    tracing::info!(chunks = heap.len(), "heap budget exhausted");
    coordinator.on_fatal_error(
        "MarkCompactCollector",
        "Allocation failed - JavaScript heap out of memory",
    )
}

#[derive(Debug)]
struct Record {
    id: usize,
    label: String,
    hits: u64,
}

fn busy_loop(limit: Duration, items: usize) {
    let started = Instant::now();
    let mut rounds: u64 = 0;
    while started.elapsed() < limit {
        let mut records: Vec<Record> = (0..items)
            .map(|id| Record {
                id,
                label: format!("record-{id}"),
                hits: 0,
            })
            .collect();
        for record in records.iter_mut() {
            record.hits += record.id as u64;
            record.label.push('!');
        }
        while let Some(record) = records.pop() {
            std::hint::black_box(record);
        }
        rounds += 1;
    }
    tracing::info!(rounds, "loop time limit reached");
}
