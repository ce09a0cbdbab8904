//! The trigger coordinator.
//!
//! A [`Coordinator`] owns everything that decides whether an event produces a
//! report:
//! - the armed set and the per-kind hooks that feed it
//! - the output target, verbose and core-dump settings
//! - the generation slot that serializes rendering
//!
//! Handles are cheap clones of one shared state. When the last handle is
//! dropped every installed hook is removed.

use crate::config::{options, ReportConfig};
use crate::dispatch::{progress, Dispatcher, Settings};
use crate::error::CoordinatorError;
use crate::hooks::{
    FatalErrorHook, HookError, HookStatus, PanicHook, SignalHook, TriggerHook,
};
use crate::logging::{event_names, Stage};
use crate::render::ReportRenderer;
use crate::report::{OutputTarget, ReportHandle, ReportRequest};
use nr_common::{parse_trigger_spec, ExitCode, SignalNumber, TriggerKind, TriggerSpec};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Message recorded for reports requested through [`Coordinator::fire_now`].
pub const API_MESSAGE: &str = "JavaScript API";
/// Location recorded for reports requested through [`Coordinator::fire_now`].
pub const API_LOCATION: &str = "TriggerReport";
/// Location recorded for reports returned by [`Coordinator::get_report`].
pub const GET_REPORT_LOCATION: &str = "GetReport";

/// Outcome of one kind in a [`Coordinator::configure`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindOutcome {
    Armed,
    Disarmed,
    /// The hook could not be changed; the kind is left disarmed.
    Failed(HookError),
}

/// Per-kind results of a configure call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigureReport {
    outcomes: BTreeMap<TriggerKind, KindOutcome>,
}

impl ConfigureReport {
    pub fn outcome(&self, kind: TriggerKind) -> Option<&KindOutcome> {
        self.outcomes.get(&kind)
    }

    /// Kinds armed by this call.
    pub fn armed(&self) -> TriggerSpec {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, KindOutcome::Armed))
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (TriggerKind, &HookError)> + '_ {
        self.outcomes.iter().filter_map(|(kind, outcome)| match outcome {
            KindOutcome::Failed(err) => Some((*kind, err)),
            _ => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TriggerKind, &KindOutcome)> + '_ {
        self.outcomes.iter().map(|(kind, outcome)| (*kind, outcome))
    }
}

struct HookTable {
    exception: PanicHook,
    fatal: FatalErrorHook,
    signal: SignalHook,
}

impl HookTable {
    fn hook(&self, kind: TriggerKind) -> Option<&dyn TriggerHook> {
        match kind {
            TriggerKind::UncaughtException => Some(&self.exception),
            TriggerKind::FatalResourceExhaustion => Some(&self.fatal),
            TriggerKind::Signal => Some(&self.signal),
            TriggerKind::ApiCall => None,
        }
    }

    fn hook_mut(&mut self, kind: TriggerKind) -> Option<&mut dyn TriggerHook> {
        match kind {
            TriggerKind::UncaughtException => Some(&mut self.exception),
            TriggerKind::FatalResourceExhaustion => Some(&mut self.fatal),
            TriggerKind::Signal => Some(&mut self.signal),
            TriggerKind::ApiCall => None,
        }
    }
}

struct Inner {
    dispatcher: Arc<Dispatcher>,
    hooks: Mutex<HookTable>,
    initial_events: TriggerSpec,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let hooks = self.hooks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for kind in TriggerKind::ALL {
            if let Some(hook) = hooks.hook_mut(kind) {
                let _ = hook.uninstall();
            }
        }
    }
}

/// Report trigger coordinator.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("armed", &self.armed_kinds())
            .field("signal", &self.signal_number())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator. Nothing is armed until [`start`](Self::start)
    /// or [`configure`](Self::configure).
    pub fn new(config: ReportConfig, renderer: Arc<dyn ReportRenderer>) -> Self {
        let settings = Settings {
            target: OutputTarget {
                directory: config.directory.clone(),
                filename: config.filename.clone(),
                ..OutputTarget::default()
            },
            verbose: config.verbose,
            core_dump: config.core_dump,
        };
        let dispatcher = Arc::new(Dispatcher::new(settings, renderer));
        let weak = Arc::downgrade(&dispatcher);
        let hooks = HookTable {
            exception: PanicHook::new(weak.clone()),
            fatal: FatalErrorHook::new(),
            signal: SignalHook::new(weak, config.signal),
        };
        Self {
            inner: Arc::new(Inner {
                dispatcher,
                hooks: Mutex::new(hooks),
                initial_events: config.events,
            }),
        }
    }

    fn hooks(&self) -> MutexGuard<'_, HookTable> {
        self.inner.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Arm the kinds named by the startup configuration.
    pub fn start(&self) -> ConfigureReport {
        let report = self.configure(&self.inner.initial_events);
        progress!(
            self.dispatcher().verbose(),
            target: event_names::CONFIG_LOADED,
            stage = %Stage::Init,
            armed = %report.armed(),
            "report triggers initialised"
        );
        report
    }

    /// Make exactly the kinds in `spec` armed.
    ///
    /// Each kind's hook is installed or removed independently; a hook that
    /// fails leaves its kind disarmed and does not affect the others.
    pub fn configure(&self, spec: &TriggerSpec) -> ConfigureReport {
        let mut hooks = self.hooks();
        let dispatcher = self.dispatcher();
        let verbose = dispatcher.verbose();
        let mut report = ConfigureReport::default();

        for kind in TriggerKind::ALL {
            let want = spec.contains(kind);
            let result = match hooks.hook_mut(kind) {
                None => Ok(()),
                Some(hook) if want => hook.install(),
                Some(hook) => {
                    dispatcher.set_armed(kind, false);
                    hook.uninstall()
                }
            };

            let outcome = match result {
                Ok(()) => {
                    dispatcher.set_armed(kind, want);
                    if want {
                        progress!(
                            verbose,
                            target: event_names::TRIGGER_ARMED,
                            stage = %Stage::Configure,
                            kind = %kind,
                            "trigger armed"
                        );
                        KindOutcome::Armed
                    } else {
                        tracing::debug!(
                            target: event_names::TRIGGER_DISARMED,
                            stage = %Stage::Configure,
                            kind = %kind,
                            "trigger disarmed"
                        );
                        KindOutcome::Disarmed
                    }
                }
                Err(err) => {
                    dispatcher.set_armed(kind, false);
                    tracing::warn!(
                        target: event_names::HOOK_FAILED,
                        stage = %Stage::Configure,
                        kind = %kind,
                        error = %err,
                        "hook change failed; trigger left disarmed"
                    );
                    KindOutcome::Failed(err)
                }
            };
            report.outcomes.insert(kind, outcome);
        }
        report
    }

    /// Parse a trigger specification and apply it.
    pub fn configure_str(&self, text: &str) -> Result<ConfigureReport, CoordinatorError> {
        let spec = parse_trigger_spec(Some(text))?;
        Ok(self.configure(&spec))
    }

    pub fn armed_kinds(&self) -> TriggerSpec {
        self.dispatcher().armed()
    }

    pub fn hook_status(&self, kind: TriggerKind) -> HookStatus {
        match self.hooks().hook(kind) {
            None => HookStatus::NotRequired,
            Some(hook) if hook.is_installed() => HookStatus::Installed,
            Some(_) => HookStatus::NotInstalled,
        }
    }

    /// Produce a report now, as the `apicall` trigger.
    ///
    /// `filename` overrides the configured target for this report only.
    pub fn fire_now(&self, filename: Option<&str>) -> Result<ReportHandle, CoordinatorError> {
        let request = ReportRequest::new(TriggerKind::ApiCall, API_MESSAGE, API_LOCATION)
            .with_filename(filename.map(str::to_string));
        match self.dispatcher().trigger(request) {
            None => Err(CoordinatorError::Disarmed(TriggerKind::ApiCall)),
            Some(result) => Ok(result?),
        }
    }

    /// Produce a report and return its text instead of writing it.
    ///
    /// Works whether or not `apicall` is armed, and waits behind any
    /// in-flight report like every other request.
    pub fn get_report(&self) -> Result<String, CoordinatorError> {
        let request = ReportRequest::new(TriggerKind::ApiCall, API_MESSAGE, GET_REPORT_LOCATION);
        let (_, text) = self.dispatcher().generate_string(request)?;
        Ok(text)
    }

    pub fn signal_number(&self) -> SignalNumber {
        self.hooks().signal.signal()
    }

    /// Bind the signal trigger to `signal`.
    ///
    /// If the trigger is armed its handler moves to the new signal and the
    /// previous disposition is restored. Should the new handler fail to
    /// install, the signal trigger is disarmed.
    pub fn set_signal_number(&self, signal: SignalNumber) -> Result<(), CoordinatorError> {
        let mut hooks = self.hooks();
        match hooks.signal.rebind(signal) {
            Ok(()) => Ok(()),
            Err(err) => {
                if !hooks.signal.is_installed() {
                    self.dispatcher().set_armed(TriggerKind::Signal, false);
                }
                Err(err.into())
            }
        }
    }

    /// Set the output directory and generated-name prefix.
    pub fn set_output_target(
        &self,
        directory: Option<PathBuf>,
        prefix: &str,
    ) -> Result<(), CoordinatorError> {
        if let Some(dir) = &directory {
            options::parse_directory(&dir.to_string_lossy())?;
        }
        let prefix = options::parse_prefix(prefix)?;
        let mut settings = self.dispatcher().settings_mut();
        settings.target.directory = directory;
        settings.target.prefix = prefix;
        Ok(())
    }

    /// Set or clear the fixed report filename.
    pub fn set_filename(&self, filename: Option<&str>) -> Result<(), CoordinatorError> {
        let filename = match filename {
            Some(name) => Some(options::parse_filename(name)?),
            None => None,
        };
        self.dispatcher().settings_mut().target.filename = filename;
        Ok(())
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.dispatcher().settings_mut().verbose = verbose;
    }

    pub fn set_core_dump(&self, core_dump: bool) {
        self.dispatcher().settings_mut().core_dump = core_dump;
    }

    pub fn output_target(&self) -> OutputTarget {
        self.dispatcher().settings().target.clone()
    }

    pub fn verbose(&self) -> bool {
        self.dispatcher().verbose()
    }

    pub fn core_dump(&self) -> bool {
        self.dispatcher().core_dump()
    }

    /// Reports generated so far, oldest first.
    pub fn reports(&self) -> Vec<ReportHandle> {
        self.dispatcher().reports()
    }

    /// Disarm everything and remove all hooks.
    pub fn shutdown(&self) -> ConfigureReport {
        let report = self.configure(&TriggerSpec::none());
        tracing::debug!(
            target: event_names::HOOK_REMOVED,
            stage = %Stage::Shutdown,
            clean = report.is_clean(),
            "coordinator shut down"
        );
        report
    }

    /// Handle a fatal runtime condition and end the process.
    ///
    /// Writes `FATAL ERROR: <location> <message>` to stderr, reports if the
    /// `fatalerror` trigger is armed, then aborts (core dump on) or exits
    /// with [`ExitCode::FatalError`].
    pub fn on_fatal_error(&self, location: &str, message: &str) -> ! {
        eprintln!("FATAL ERROR: {location} {message}");

        let hooked = self.hook_status(TriggerKind::FatalResourceExhaustion) == HookStatus::Installed;
        if hooked {
            let request =
                ReportRequest::new(TriggerKind::FatalResourceExhaustion, message, location);
            // Failures are logged by the dispatcher.
            let _ = self.dispatcher().trigger(request);
        }

        let _ = std::io::stderr().flush();
        if self.core_dump() {
            std::process::abort();
        }
        std::process::exit(ExitCode::FatalError.as_i32());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderError;
    use crate::report::Destination;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        seen: StdMutex<Vec<ReportHandle>>,
    }

    impl ReportRenderer for Recorder {
        fn generate(&self, handle: &ReportHandle) -> Result<PathBuf, RenderError> {
            self.seen.lock().unwrap().push(handle.clone());
            Ok(handle
                .path()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(handle.destination.to_string())))
        }
    }

    fn coordinator(events: TriggerSpec) -> (Coordinator, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let config = ReportConfig {
            events,
            filename: Some("stdout".to_string()),
            ..ReportConfig::default()
        };
        (Coordinator::new(config, recorder.clone()), recorder)
    }

    #[test]
    fn nothing_is_armed_before_start() {
        let (coordinator, _) = coordinator(TriggerSpec::only(TriggerKind::ApiCall));
        assert!(coordinator.armed_kinds().is_empty());
        let report = coordinator.start();
        assert!(report.is_clean());
        assert_eq!(coordinator.armed_kinds(), TriggerSpec::only(TriggerKind::ApiCall));
    }

    #[test]
    fn fire_now_requires_apicall() {
        let (coordinator, recorder) = coordinator(TriggerSpec::none());
        coordinator.start();
        let err = coordinator.fire_now(None).unwrap_err();
        assert!(matches!(err, CoordinatorError::Disarmed(TriggerKind::ApiCall)));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn fire_now_records_handle() {
        let (coordinator, recorder) = coordinator(TriggerSpec::only(TriggerKind::ApiCall));
        coordinator.start();
        let handle = coordinator.fire_now(Some("stderr")).unwrap();
        assert_eq!(handle.destination, Destination::Stderr);
        assert_eq!(handle.kind, TriggerKind::ApiCall);
        assert_eq!(handle.message, API_MESSAGE);
        assert_eq!(handle.location, API_LOCATION);
        assert_eq!(handle.sequence, 1);
        assert_eq!(coordinator.reports(), vec![handle.clone()]);
        assert_eq!(recorder.seen.lock().unwrap().as_slice(), &[handle]);
    }

    #[test]
    fn get_report_needs_no_armed_kind() {
        let config = ReportConfig {
            events: TriggerSpec::none(),
            ..ReportConfig::default()
        };
        let coordinator = Coordinator::new(config, Arc::new(crate::render::TextRenderer::new()));
        coordinator.start();
        let text = coordinator.get_report().unwrap();
        assert!(text.contains("location: \"GetReport\""));
        assert!(text.contains("Filename: string"));
        assert!(coordinator.reports().is_empty());
    }

    #[test]
    fn get_report_surfaces_renderer_limits() {
        let (coordinator, recorder) = coordinator(TriggerSpec::none());
        let err = coordinator.get_report().unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Generation(crate::error::GenerationError::Render(
                RenderError::Unsupported
            ))
        ));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn configure_is_total() {
        let (coordinator, _) = coordinator(TriggerSpec::none());
        let spec: TriggerSpec = [TriggerKind::ApiCall, TriggerKind::FatalResourceExhaustion]
            .into_iter()
            .collect();
        let report = coordinator.configure(&spec);
        assert_eq!(report.armed(), spec);
        assert_eq!(
            report.outcome(TriggerKind::Signal),
            Some(&KindOutcome::Disarmed)
        );
        assert_eq!(
            coordinator.hook_status(TriggerKind::FatalResourceExhaustion),
            HookStatus::Installed
        );
        assert_eq!(coordinator.hook_status(TriggerKind::ApiCall), HookStatus::NotRequired);

        let report = coordinator.configure(&TriggerSpec::only(TriggerKind::ApiCall));
        assert_eq!(report.armed(), TriggerSpec::only(TriggerKind::ApiCall));
        assert_eq!(
            coordinator.hook_status(TriggerKind::FatalResourceExhaustion),
            HookStatus::NotInstalled
        );
    }

    #[test]
    fn configure_str_rejects_unknown_tokens_without_changes() {
        let (coordinator, _) = coordinator(TriggerSpec::only(TriggerKind::ApiCall));
        coordinator.start();
        let err = coordinator.configure_str("apicall+bogus").unwrap_err();
        assert!(matches!(err, CoordinatorError::Config(_)));
        assert_eq!(coordinator.armed_kinds(), TriggerSpec::only(TriggerKind::ApiCall));
    }

    #[test]
    fn disarming_never_installed_hooks_is_a_noop() {
        let (coordinator, _) = coordinator(TriggerSpec::none());
        let report = coordinator.shutdown();
        assert!(report.is_clean());
        assert!(coordinator.armed_kinds().is_empty());
    }

    #[test]
    fn output_setters_validate() {
        let (coordinator, _) = coordinator(TriggerSpec::none());
        coordinator
            .set_output_target(Some(PathBuf::from("/tmp/reports")), "Report")
            .unwrap();
        let target = coordinator.output_target();
        assert_eq!(target.prefix, "Report");
        assert_eq!(target.directory, Some(PathBuf::from("/tmp/reports")));

        assert!(coordinator.set_output_target(None, "").is_err());
        assert_eq!(coordinator.output_target().prefix, "Report");

        coordinator.set_filename(None).unwrap();
        assert_eq!(coordinator.output_target().filename, None);
        assert!(coordinator.set_filename(Some(&"x".repeat(65))).is_err());

        coordinator.set_verbose(true);
        coordinator.set_core_dump(false);
        assert!(coordinator.verbose());
        assert!(!coordinator.core_dump());
    }

    #[cfg(unix)]
    #[test]
    fn uncatchable_signal_is_rejected() {
        let (coordinator, _) = coordinator(TriggerSpec::none());
        let err = coordinator.set_signal_number(SignalNumber::SIGKILL).unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Hook(HookError::InvalidSignal(SignalNumber::SIGKILL))
        ));
        assert_eq!(coordinator.signal_number(), SignalNumber::SIGUSR2);
    }
}
