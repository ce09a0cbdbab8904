//! Report rendering.
//!
//! The coordinator hands every armed event to a [`ReportRenderer`]. The
//! bundled [`TextRenderer`] writes the plain-text section grammar:
//!
//! ```text
//! ================================================================================
//! ==== NodeReport ================================================================
//!
//! Event: JavaScript API, location: "TriggerReport"
//! ...
//! ================================================================================
//! ==== JavaScript Stack Trace ====================================================
//! ...
//! ================================================================================
//! ```
//!
//! Runtime internals (stack frames, heap figures) come from a host-supplied
//! [`RuntimeInspector`]; everything else is read from the OS.

use crate::report::{Destination, ReportHandle};
use chrono::{DateTime, Local};
use nr_common::section::{closing_delimiter, opening_delimiter};
use nr_common::SectionName;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Version of this crate, written to the report header.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Header text written when the host runtime reports no version.
pub const UNKNOWN_RUNTIME_VERSION: &str = "Unable to determine Node.js version";

/// Errors raised while writing a report.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to open report file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write report to {destination}: {source}")]
    Write {
        destination: String,
        #[source]
        source: io::Error,
    },

    #[error("renderer cannot produce in-memory reports")]
    Unsupported,
}

/// Collaborator that turns a handle into report text.
pub trait ReportRenderer: Send + Sync {
    /// Write the report and return where it went (`stdout`/`stderr` for
    /// stream destinations).
    fn generate(&self, handle: &ReportHandle) -> Result<PathBuf, RenderError>;

    /// Return the report text instead of writing it.
    fn render_string(&self, _handle: &ReportHandle) -> Result<String, RenderError> {
        Err(RenderError::Unsupported)
    }
}

/// Heap figures supplied by the host runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub total_size: u64,
    pub used_size: u64,
    pub available_size: u64,
    pub size_limit: u64,
}

/// Source of runtime-internal diagnostics.
pub trait RuntimeInspector: Send + Sync {
    /// Frames of the current runtime stack, innermost first.
    fn stack_frames(&self) -> Vec<String> {
        Vec::new()
    }

    fn heap(&self) -> Option<HeapStats> {
        None
    }
}

/// Inspector for hosts with nothing to report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullInspector;

impl RuntimeInspector for NullInspector {}

/// Host runtime identification for the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub version: Option<String>,
    /// Component versions, written as `(name: version, ...)`.
    pub components: Vec<(String, String)>,
}

impl RuntimeInfo {
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_component(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.components.push((name.into(), version.into()));
        self
    }
}

/// Plain-text renderer for the report section grammar.
pub struct TextRenderer {
    inspector: Arc<dyn RuntimeInspector>,
    runtime: RuntimeInfo,
    load_time: DateTime<Local>,
    command_line: Vec<String>,
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRenderer {
    pub fn new() -> Self {
        Self {
            inspector: Arc::new(NullInspector),
            runtime: RuntimeInfo::default(),
            load_time: Local::now(),
            command_line: std::env::args().collect(),
        }
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn RuntimeInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeInfo) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_command_line(mut self, argv: Vec<String>) -> Self {
        self.command_line = argv;
        self
    }

    /// Write the full report text to `out`.
    pub fn render_to<W: Write>(&self, handle: &ReportHandle, out: &mut W) -> io::Result<()> {
        self.write_header(handle, out)?;
        self.write_stack(out)?;
        self.write_heap(out)?;
        write_resource_usage(out)?;
        write_system_information(out)?;
        writeln!(out)?;
        writeln!(out, "{}", closing_delimiter())?;
        out.flush()
    }

    fn write_header<W: Write>(&self, handle: &ReportHandle, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", closing_delimiter())?;
        writeln!(out, "{}", opening_delimiter(SectionName::Header.title()))?;
        writeln!(out)?;
        writeln!(
            out,
            "Event: {}, location: \"{}\"",
            handle.message, handle.location
        )?;
        writeln!(out, "Filename: {}", handle.destination.display_name())?;
        writeln!(
            out,
            "Dump event time:  {}",
            handle.created_at.format("%Y/%m/%d %H:%M:%S")
        )?;
        writeln!(
            out,
            "Module load time: {}",
            self.load_time.format("%Y/%m/%d %H:%M:%S")
        )?;
        writeln!(out, "Process ID: {}", handle.pid)?;
        writeln!(out, "Command line: {}", self.command_line.join(" "))?;
        writeln!(out)?;

        match &self.runtime.version {
            Some(version) => writeln!(out, "Node.js version: {version}")?,
            None => writeln!(out, "Node.js version: {UNKNOWN_RUNTIME_VERSION}")?,
        }
        if !self.runtime.components.is_empty() {
            let parts: Vec<String> = self
                .runtime
                .components
                .iter()
                .map(|(name, version)| format!("{name}: {version}"))
                .collect();
            writeln!(out, "({})", parts.join(", "))?;
        }
        writeln!(out)?;
        writeln!(out, "NodeReport version: {TOOL_VERSION}")?;
        write_os_version(out)
    }

    fn write_stack<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_section_start(out, SectionName::JavaScriptStackTrace.title())?;
        let frames = self.inspector.stack_frames();
        if frames.is_empty() {
            writeln!(out, "No stack trace available")?;
        }
        for (index, frame) in frames.iter().enumerate() {
            writeln!(out, "{index:2}: {frame}")?;
        }
        Ok(())
    }

    fn write_heap<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_section_start(out, SectionName::JavaScriptHeap.title())?;
        match self.inspector.heap() {
            Some(heap) => {
                writeln!(out, "Total heap memory size: {} bytes", group_thousands(heap.total_size))?;
                writeln!(out, "Total used heap memory: {} bytes", group_thousands(heap.used_size))?;
                writeln!(
                    out,
                    "Total available heap memory: {} bytes",
                    group_thousands(heap.available_size)
                )?;
                writeln!(out)?;
                writeln!(out, "Heap memory limit: {}", group_thousands(heap.size_limit))
            }
            None => writeln!(out, "No heap statistics available"),
        }
    }
}

impl ReportRenderer for TextRenderer {
    fn generate(&self, handle: &ReportHandle) -> Result<PathBuf, RenderError> {
        let write_err = |source| RenderError::Write {
            destination: handle.destination.to_string(),
            source,
        };
        match &handle.destination {
            Destination::File(path) => {
                let file = File::create(path).map_err(|source| RenderError::Open {
                    path: path.clone(),
                    source,
                })?;
                let mut out = BufWriter::new(file);
                self.render_to(handle, &mut out).map_err(write_err)?;
                Ok(path.clone())
            }
            Destination::Stdout => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                self.render_to(handle, &mut out).map_err(write_err)?;
                Ok(PathBuf::from(crate::report::STDOUT_NAME))
            }
            Destination::Stderr => {
                let stderr = io::stderr();
                let mut out = stderr.lock();
                self.render_to(handle, &mut out).map_err(write_err)?;
                Ok(PathBuf::from(crate::report::STDERR_NAME))
            }
            Destination::Memory => Err(RenderError::Unsupported),
        }
    }

    fn render_string(&self, handle: &ReportHandle) -> Result<String, RenderError> {
        let mut out = Vec::new();
        self.render_to(handle, &mut out)
            .map_err(|source| RenderError::Write {
                destination: handle.destination.to_string(),
                source,
            })?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

fn write_section_start<W: Write>(out: &mut W, title: &str) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", closing_delimiter())?;
    writeln!(out, "{}", opening_delimiter(title))?;
    writeln!(out)
}

/// Format an integer with comma thousands separators.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(unix)]
fn write_os_version<W: Write>(out: &mut W) -> io::Result<()> {
    // SAFETY: utsname is plain data; uname fills it in on success.
    let mut info: libc::utsname = unsafe { std::mem::zeroed() };
    if unsafe { libc::uname(&mut info) } != 0 {
        return Ok(());
    }
    let field = |raw: &[libc::c_char]| {
        let bytes: Vec<u8> = raw
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    };
    writeln!(out)?;
    writeln!(
        out,
        "OS version: {} {} {}",
        field(&info.sysname),
        field(&info.release),
        field(&info.version)
    )?;
    writeln!(out)?;
    writeln!(out, "Machine: {} {}", field(&info.nodename), field(&info.machine))
}

#[cfg(not(unix))]
fn write_os_version<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "OS version: {}", std::env::consts::OS)?;
    writeln!(out)?;
    writeln!(out, "Machine: {}", std::env::consts::ARCH)
}

#[cfg(unix)]
fn write_resource_usage<W: Write>(out: &mut W) -> io::Result<()> {
    write_section_start(out, "Resource Usage")?;
    writeln!(out, "Process total resource usage:")?;
    // SAFETY: rusage is plain data; getrusage fills it in on success.
    let mut stats: libc::rusage = unsafe { std::mem::zeroed() };
    if unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut stats) } == 0 {
        writeln!(
            out,
            "  User mode CPU: {}.{:06} secs",
            stats.ru_utime.tv_sec, stats.ru_utime.tv_usec
        )?;
        writeln!(
            out,
            "  Kernel mode CPU: {}.{:06} secs",
            stats.ru_stime.tv_sec, stats.ru_stime.tv_usec
        )?;
        // Linux reports kilobytes, macOS bytes.
        let rss_scale: u64 = if cfg!(target_os = "macos") { 1 } else { 1024 };
        writeln!(
            out,
            "  Maximum resident set size: {} bytes",
            group_thousands((stats.ru_maxrss.max(0) as u64).saturating_mul(rss_scale))
        )?;
        writeln!(
            out,
            "  Page faults: {} (I/O required) {} (no I/O required)",
            stats.ru_majflt, stats.ru_minflt
        )?;
        writeln!(
            out,
            "  Filesystem activity: {} reads {} writes",
            stats.ru_inblock, stats.ru_oublock
        )?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn write_resource_usage<W: Write>(_out: &mut W) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn write_system_information<W: Write>(out: &mut W) -> io::Result<()> {
    write_section_start(out, SectionName::SystemInformation.title())?;
    write_environment(out)?;

    let limits: [(&str, libc::c_int); 10] = [
        ("core file size (blocks)       ", libc::RLIMIT_CORE as libc::c_int),
        ("data seg size (kbytes)        ", libc::RLIMIT_DATA as libc::c_int),
        ("file size (blocks)            ", libc::RLIMIT_FSIZE as libc::c_int),
        ("max locked memory (bytes)     ", libc::RLIMIT_MEMLOCK as libc::c_int),
        ("max memory size (kbytes)      ", libc::RLIMIT_RSS as libc::c_int),
        ("open files                    ", libc::RLIMIT_NOFILE as libc::c_int),
        ("stack size (bytes)            ", libc::RLIMIT_STACK as libc::c_int),
        ("cpu time (seconds)            ", libc::RLIMIT_CPU as libc::c_int),
        ("max user processes            ", libc::RLIMIT_NPROC as libc::c_int),
        ("virtual memory (kbytes)       ", libc::RLIMIT_AS as libc::c_int),
    ];

    writeln!(out)?;
    writeln!(
        out,
        "Resource limits                        soft limit      hard limit"
    )?;
    for (description, resource) in limits {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: `limit` is a valid out-pointer for the call.
        if unsafe { libc::getrlimit(resource as _, &mut limit) } != 0 {
            continue;
        }
        writeln!(
            out,
            "  {} {}{}",
            description,
            format_limit(limit.rlim_cur as u64, limit.rlim_cur == libc::RLIM_INFINITY),
            format_limit(limit.rlim_max as u64, limit.rlim_max == libc::RLIM_INFINITY)
        )?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn write_system_information<W: Write>(out: &mut W) -> io::Result<()> {
    write_section_start(out, SectionName::SystemInformation.title())?;
    write_environment(out)
}

fn write_environment<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "Environment variables")?;
    for (key, value) in std::env::vars_os() {
        writeln!(out, "  {}={}", key.to_string_lossy(), value.to_string_lossy())?;
    }
    Ok(())
}

#[cfg(unix)]
fn format_limit(value: u64, unlimited: bool) -> String {
    if unlimited {
        format!("{:>16}", "unlimited")
    } else {
        format!("{value:>16}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use nr_common::{ProcessId, TriggerKind};

    struct FixedInspector;

    impl RuntimeInspector for FixedInspector {
        fn stack_frames(&self) -> Vec<String> {
            vec!["main (app.js:1:1)".to_string(), "run (app.js:9:3)".to_string()]
        }

        fn heap(&self) -> Option<HeapStats> {
            Some(HeapStats {
                total_size: 8_388_608,
                used_size: 4_194_304,
                available_size: 1_000,
                size_limit: 1_526_909_922,
            })
        }
    }

    fn handle() -> ReportHandle {
        ReportHandle {
            destination: Destination::File(PathBuf::from("/tmp/NodeReport.20240101.120000.42.001.txt")),
            pid: ProcessId(42),
            kind: TriggerKind::ApiCall,
            sequence: 1,
            message: "JavaScript API".to_string(),
            location: "TriggerReport".to_string(),
            created_at: Local::now(),
        }
    }

    fn render(renderer: &TextRenderer) -> String {
        let mut buf = Vec::new();
        renderer.render_to(&handle(), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn group_thousands_inserts_commas() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
        assert_eq!(group_thousands(u64::MAX), "18,446,744,073,709,551,615");
    }

    #[test]
    fn header_carries_identity_lines() {
        let renderer = TextRenderer::new().with_command_line(vec!["app".into(), "--flag".into()]);
        let text = render(&renderer);

        assert!(text.contains("Event: JavaScript API, location: \"TriggerReport\"\n"));
        assert!(text.contains("Filename: NodeReport.20240101.120000.42.001.txt\n"));
        assert!(text.contains("Process ID: 42\n"));
        assert!(text.contains("Command line: app --flag\n"));
        assert!(text.contains(&format!("NodeReport version: {TOOL_VERSION}\n")));
        assert!(text.contains("Node.js version: Unable to determine Node.js version\n"));
    }

    #[test]
    fn every_fixed_section_appears_once() {
        let text = render(&TextRenderer::new());
        for section in SectionName::ALL {
            let title = opening_delimiter(section.title());
            assert_eq!(text.matches(&title).count(), 1, "{section}");
        }
        assert!(text.starts_with(&closing_delimiter()));
        assert!(text.ends_with(&format!("{}\n", closing_delimiter())));
    }

    #[test]
    fn runtime_data_is_written() {
        let renderer = TextRenderer::new()
            .with_inspector(Arc::new(FixedInspector))
            .with_runtime(RuntimeInfo::default().with_version("v8.9.4").with_component("v8", "6.1"));
        let text = render(&renderer);

        assert!(text.contains(" 0: main (app.js:1:1)\n"));
        assert!(text.contains(" 1: run (app.js:9:3)\n"));
        assert!(text.contains("Total heap memory size: 8,388,608 bytes\n"));
        assert!(text.contains("Heap memory limit: 1,526,909,922\n"));
        assert!(text.contains("Node.js version: v8.9.4\n(v8: 6.1)\n"));
    }

    #[test]
    fn empty_runtime_says_so() {
        let text = render(&TextRenderer::new());
        assert!(text.contains("No stack trace available\n"));
        assert!(text.contains("No heap statistics available\n"));
    }

    #[test]
    fn generate_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = handle();
        let path = dir.path().join("report.txt");
        handle.destination = Destination::File(path.clone());

        let written = TextRenderer::new().generate(&handle).unwrap();
        assert_eq!(written, path);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Process ID: 42"));
    }

    #[test]
    fn generate_reports_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = handle();
        handle.destination = Destination::File(dir.path().join("missing").join("report.txt"));

        let err = TextRenderer::new().generate(&handle).unwrap_err();
        assert!(matches!(err, RenderError::Open { .. }));
    }
}
