//! Event routing into the generation slot.
//!
//! The [`Dispatcher`] is the part of the coordinator that hooks can reach:
//! it owns the armed set, the output settings, the renderer and the
//! generation slot. Hooks hold it through a `Weak` handle.

use crate::error::GenerationError;
use crate::logging::{event_names, Stage};
use crate::queue::{GenerationSlot, SlotGuard};
use crate::render::{RenderError, ReportRenderer};
use crate::report::{Destination, OutputTarget, ReportHandle, ReportRequest};
use chrono::Local;
use nr_common::{ProcessId, TriggerKind, TriggerSpec};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Completed reports kept for [`Dispatcher::reports`]; older ones are dropped.
pub(crate) const HISTORY_LIMIT: usize = 256;

/// Log at `info` in verbose mode, otherwise at `debug`.
macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            ::tracing::info!($($arg)+)
        } else {
            ::tracing::debug!($($arg)+)
        }
    };
}
pub(crate) use progress;

/// Mutable output settings.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub target: OutputTarget,
    pub verbose: bool,
    pub core_dump: bool,
}

pub(crate) struct Dispatcher {
    armed: RwLock<TriggerSpec>,
    settings: RwLock<Settings>,
    slot: GenerationSlot,
    renderer: Arc<dyn ReportRenderer>,
    sequence: AtomicU32,
    history: Mutex<VecDeque<ReportHandle>>,
    pid: ProcessId,
}

impl Dispatcher {
    pub fn new(settings: Settings, renderer: Arc<dyn ReportRenderer>) -> Self {
        Self {
            armed: RwLock::new(TriggerSpec::none()),
            settings: RwLock::new(settings),
            slot: GenerationSlot::new(),
            renderer,
            sequence: AtomicU32::new(0),
            history: Mutex::new(VecDeque::new()),
            pid: ProcessId::current(),
        }
    }

    pub fn settings(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings_mut(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn armed(&self) -> TriggerSpec {
        self.armed.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_armed(&self, kind: TriggerKind, on: bool) {
        let mut armed = self.armed.write().unwrap_or_else(PoisonError::into_inner);
        if on {
            armed.insert(kind);
        } else {
            armed.remove(kind);
        }
    }

    pub fn is_armed(&self, kind: TriggerKind) -> bool {
        self.armed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(kind)
    }

    pub fn verbose(&self) -> bool {
        self.settings().verbose
    }

    pub fn core_dump(&self) -> bool {
        self.settings().core_dump
    }

    /// The most recent completed reports, oldest first.
    pub fn reports(&self) -> Vec<ReportHandle> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn record(&self, handle: &ReportHandle) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(handle.clone());
    }

    /// Generate a report if the request's kind is armed.
    ///
    /// Returns `None` for disarmed kinds.
    pub fn trigger(&self, request: ReportRequest) -> Option<Result<ReportHandle, GenerationError>> {
        if !self.is_armed(request.kind) {
            tracing::debug!(
                target: event_names::TRIGGER_IGNORED,
                stage = %Stage::Hook,
                kind = %request.kind,
                "event ignored, kind not armed"
            );
            return None;
        }
        Some(self.generate(request))
    }

    /// Wait for the generation slot; requests are served in arrival order.
    fn acquire(&self, request: &ReportRequest, verbose: bool) -> Result<SlotGuard<'_>, GenerationError> {
        let kind = request.kind;
        progress!(
            verbose,
            target: event_names::TRIGGER_FIRED,
            stage = %Stage::Hook,
            kind = %kind,
            location = %request.location,
            "{}",
            request.message
        );

        self.slot
            .acquire_with(|ahead| {
                progress!(
                    verbose,
                    target: event_names::REPORT_QUEUED,
                    stage = %Stage::Queue,
                    kind = %kind,
                    ahead,
                    "report queued behind in-flight generation"
                );
            })
            .map_err(|err| {
                tracing::warn!(
                    target: event_names::REPORT_REENTRANT,
                    stage = %Stage::Queue,
                    kind = %kind,
                    "report requested while this thread is generating one; skipped"
                );
                err
            })
    }

    /// Build the handle for a request. Call with the slot held.
    fn next_handle(&self, request: ReportRequest, destination: Option<Destination>) -> ReportHandle {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        let created_at = Local::now();
        let destination = destination.unwrap_or_else(|| {
            self.settings().target.resolve(
                request.filename.as_deref(),
                self.pid,
                sequence,
                &created_at,
            )
        });

        ReportHandle {
            destination,
            pid: self.pid,
            kind: request.kind,
            sequence,
            message: request.message,
            location: request.location,
            created_at,
        }
    }

    fn log_failure(&self, handle: &ReportHandle, err: &RenderError) {
        tracing::error!(
            target: event_names::REPORT_FAILED,
            stage = %Stage::Render,
            kind = %handle.kind,
            sequence = handle.sequence,
            error = %err,
            "report generation failed"
        );
    }

    /// Generate a report unconditionally.
    pub fn generate(&self, request: ReportRequest) -> Result<ReportHandle, GenerationError> {
        let verbose = self.verbose();
        let _slot = self.acquire(&request, verbose)?;
        let handle = self.next_handle(request, None);
        let span = tracing::info_span!("report", kind = %handle.kind, sequence = handle.sequence);
        let _entered = span.enter();

        if matches!(handle.destination, Destination::File(_)) {
            eprintln!(
                "\nWriting Node.js report to file: {}",
                handle.destination.display_name()
            );
        }
        progress!(
            verbose,
            target: event_names::REPORT_STARTED,
            stage = %Stage::Render,
            destination = %handle.destination,
            "generating report"
        );

        match self.renderer.generate(&handle) {
            Ok(path) => {
                eprintln!("Node.js report completed");
                progress!(
                    verbose,
                    target: event_names::REPORT_FINISHED,
                    stage = %Stage::Render,
                    path = %path.display(),
                    "report completed"
                );
                self.record(&handle);
                Ok(handle)
            }
            Err(err) => {
                if let RenderError::Open { source, .. } = &err {
                    eprintln!(
                        "\nFailed to open Node.js report file: {} (errno: {})",
                        handle.destination.display_name(),
                        source.raw_os_error().unwrap_or(0)
                    );
                }
                self.log_failure(&handle, &err);
                Err(err.into())
            }
        }
    }

    /// Generate a report into memory, bypassing the output target.
    ///
    /// Shares the slot and sequence with file reports but is not recorded in
    /// the history and prints no progress lines.
    pub fn generate_string(&self, request: ReportRequest) -> Result<(ReportHandle, String), GenerationError> {
        let verbose = self.verbose();
        let _slot = self.acquire(&request, verbose)?;
        let handle = self.next_handle(request, Some(Destination::Memory));
        let span = tracing::info_span!("report", kind = %handle.kind, sequence = handle.sequence);
        let _entered = span.enter();

        match self.renderer.render_string(&handle) {
            Ok(text) => {
                progress!(
                    verbose,
                    target: event_names::REPORT_FINISHED,
                    stage = %Stage::Render,
                    bytes = text.len(),
                    "in-memory report completed"
                );
                Ok((handle, text))
            }
            Err(err) => {
                self.log_failure(&handle, &err);
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    struct Recorder(Mutex<Vec<u32>>);

    impl ReportRenderer for Recorder {
        fn generate(&self, handle: &ReportHandle) -> Result<PathBuf, RenderError> {
            self.0.lock().unwrap().push(handle.sequence);
            Ok(PathBuf::from(handle.destination.to_string()))
        }
    }

    struct Failing;

    impl ReportRenderer for Failing {
        fn generate(&self, handle: &ReportHandle) -> Result<PathBuf, RenderError> {
            Err(RenderError::Write {
                destination: handle.destination.to_string(),
                source: io::Error::new(io::ErrorKind::Other, "disk full"),
            })
        }
    }

    fn settings() -> Settings {
        Settings {
            target: OutputTarget {
                filename: Some("stdout".to_string()),
                ..OutputTarget::default()
            },
            verbose: false,
            core_dump: false,
        }
    }

    #[test]
    fn disarmed_kinds_are_ignored() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let dispatcher = Dispatcher::new(settings(), recorder.clone());
        let request = ReportRequest::new(TriggerKind::ApiCall, "JavaScript API", "TriggerReport");
        assert!(dispatcher.trigger(request).is_none());
        assert!(recorder.0.lock().unwrap().is_empty());
        assert!(dispatcher.reports().is_empty());
    }

    #[test]
    fn sequence_starts_at_one_and_history_records_handles() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let dispatcher = Dispatcher::new(settings(), recorder.clone());
        dispatcher.set_armed(TriggerKind::ApiCall, true);

        for _ in 0..3 {
            let request =
                ReportRequest::new(TriggerKind::ApiCall, "JavaScript API", "TriggerReport");
            let handle = dispatcher.trigger(request).unwrap().unwrap();
            assert_eq!(handle.destination, Destination::Stdout);
            assert_eq!(handle.pid, ProcessId::current());
        }
        assert_eq!(*recorder.0.lock().unwrap(), vec![1, 2, 3]);
        let sequences: Vec<u32> = dispatcher.reports().iter().map(|h| h.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn render_failures_are_not_recorded() {
        let dispatcher = Dispatcher::new(settings(), Arc::new(Failing));
        let request = ReportRequest::new(TriggerKind::ApiCall, "JavaScript API", "TriggerReport");
        let err = dispatcher.generate(request).unwrap_err();
        assert!(matches!(err, GenerationError::Render(RenderError::Write { .. })));
        assert!(dispatcher.reports().is_empty());
    }

    #[test]
    fn history_keeps_only_the_latest_reports() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let dispatcher = Dispatcher::new(settings(), recorder);
        let total = HISTORY_LIMIT as u32 + 5;
        for _ in 0..total {
            let request = ReportRequest::new(TriggerKind::Signal, "SIGUSR2", "SignalWatchdog");
            dispatcher.generate(request).unwrap();
        }
        let reports = dispatcher.reports();
        assert_eq!(reports.len(), HISTORY_LIMIT);
        assert_eq!(reports.first().map(|h| h.sequence), Some(6));
        assert_eq!(reports.last().map(|h| h.sequence), Some(total));
    }

    #[test]
    fn in_memory_reports_share_the_sequence_but_skip_history() {
        let dispatcher = Dispatcher::new(settings(), Arc::new(crate::render::TextRenderer::new()));
        let request = ReportRequest::new(TriggerKind::ApiCall, "JavaScript API", "GetReport");
        let (handle, text) = dispatcher.generate_string(request).unwrap();
        assert_eq!(handle.destination, Destination::Memory);
        assert_eq!(handle.sequence, 1);
        assert!(text.contains("Event: JavaScript API, location: \"GetReport\""));
        assert!(dispatcher.reports().is_empty());
    }

    #[test]
    fn renderers_without_memory_output_fail_cleanly() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let dispatcher = Dispatcher::new(settings(), recorder.clone());
        let request = ReportRequest::new(TriggerKind::ApiCall, "JavaScript API", "GetReport");
        let err = dispatcher.generate_string(request).unwrap_err();
        assert!(matches!(err, GenerationError::Render(RenderError::Unsupported)));
        assert!(recorder.0.lock().unwrap().is_empty());
        // The slot was released.
        let request = ReportRequest::new(TriggerKind::ApiCall, "JavaScript API", "TriggerReport");
        assert!(dispatcher.generate(request).is_ok());
    }

    #[test]
    fn arming_is_per_kind() {
        let dispatcher = Dispatcher::new(settings(), Arc::new(Failing));
        dispatcher.set_armed(TriggerKind::Signal, true);
        dispatcher.set_armed(TriggerKind::ApiCall, true);
        dispatcher.set_armed(TriggerKind::Signal, false);
        assert_eq!(dispatcher.armed(), TriggerSpec::only(TriggerKind::ApiCall));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            io::Write::write(&mut *self.0.lock().unwrap(), buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failure_events_carry_the_report_span() {
        use crate::logging::JsonlLayer;
        use tracing_subscriber::layer::SubscriberExt;

        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(JsonlLayer::new(captured.clone()));
        let dispatcher = Dispatcher::new(settings(), Arc::new(Failing));
        dispatcher.set_armed(TriggerKind::ApiCall, true);
        tracing::subscriber::with_default(subscriber, || {
            let request = ReportRequest::new(TriggerKind::ApiCall, "JavaScript API", "TriggerReport");
            assert!(matches!(dispatcher.trigger(request), Some(Err(_))));
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let failed: serde_json::Value = output
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .find(|line| line["event"] == event_names::REPORT_FAILED)
            .expect("failure event");
        assert_eq!(failed["kind"], "apicall");
        assert_eq!(failed["sequence"], 1);
    }
}
