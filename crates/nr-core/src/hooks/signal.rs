//! Signal trigger hook.
//!
//! The handler runs in signal context, so it only marks a request: it swaps
//! the signal number into a pending cell and writes one byte to a
//! non-blocking self-pipe. A watchdog thread blocks on the pipe and posts the
//! report into the generation slot from an ordinary thread. It takes the
//! pending signal before reporting, so signals raised before it wakes merge
//! into one report and a signal raised during a report queues the next one.
//!
//! One report signal can be bound per process; a second binding fails with
//! [`HookError::AlreadyBound`] until the first is removed.

use super::{HookError, TriggerHook};
use crate::dispatch::Dispatcher;
use nr_common::{SignalNumber, TriggerKind};
use std::sync::Weak;

/// Location recorded for signal-triggered reports.
pub const SIGNAL_LOCATION: &str = "SignalWatchdog";

pub struct SignalHook {
    dispatcher: Weak<Dispatcher>,
    signal: SignalNumber,
    #[cfg(unix)]
    binding: Option<unix::Binding>,
}

impl SignalHook {
    pub(crate) fn new(dispatcher: Weak<Dispatcher>, signal: SignalNumber) -> Self {
        Self {
            dispatcher,
            signal,
            #[cfg(unix)]
            binding: None,
        }
    }

    /// Signal this hook binds (or will bind on install).
    pub fn signal(&self) -> SignalNumber {
        self.signal
    }

    /// Change the bound signal.
    ///
    /// An installed hook is moved to the new signal: the previous disposition
    /// is restored before the new handler goes in. An uncatchable signal is
    /// rejected and leaves the current binding untouched.
    pub fn rebind(&mut self, signal: SignalNumber) -> Result<(), HookError> {
        if !signal.is_catchable() {
            return Err(HookError::InvalidSignal(signal));
        }
        if signal == self.signal {
            return Ok(());
        }
        let was_installed = self.is_installed();
        if was_installed {
            self.uninstall()?;
        }
        let previous = std::mem::replace(&mut self.signal, signal);
        if was_installed {
            self.install()?;
        }
        tracing::debug!(
            target: crate::logging::event_names::SIGNAL_REBOUND,
            stage = %crate::logging::Stage::Configure,
            from = %previous,
            to = %signal,
            installed = was_installed,
            "report signal changed"
        );
        Ok(())
    }
}

impl Drop for SignalHook {
    fn drop(&mut self) {
        let _ = self.uninstall();
    }
}

#[cfg(unix)]
impl TriggerHook for SignalHook {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Signal
    }

    fn install(&mut self) -> Result<(), HookError> {
        if self.binding.is_some() {
            return Ok(());
        }
        if !self.signal.is_catchable() {
            return Err(HookError::InvalidSignal(self.signal));
        }
        let binding = unix::Binding::install(self.signal, self.dispatcher.clone())?;
        self.binding = Some(binding);
        tracing::debug!(
            target: crate::logging::event_names::HOOK_INSTALLED,
            stage = %crate::logging::Stage::Configure,
            kind = %TriggerKind::Signal,
            signal = %self.signal,
            "signal handler installed"
        );
        Ok(())
    }

    fn uninstall(&mut self) -> Result<(), HookError> {
        let Some(binding) = self.binding.take() else {
            return Ok(());
        };
        binding.remove()?;
        tracing::debug!(
            target: crate::logging::event_names::HOOK_REMOVED,
            stage = %crate::logging::Stage::Configure,
            kind = %TriggerKind::Signal,
            signal = %self.signal,
            "signal handler removed"
        );
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.binding.is_some()
    }
}

#[cfg(not(unix))]
impl TriggerHook for SignalHook {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Signal
    }

    fn install(&mut self) -> Result<(), HookError> {
        Err(HookError::Unsupported(TriggerKind::Signal))
    }

    fn uninstall(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    fn is_installed(&self) -> bool {
        false
    }
}

#[cfg(unix)]
mod unix {
    use super::SIGNAL_LOCATION;
    use crate::dispatch::Dispatcher;
    use crate::hooks::HookError;
    use crate::report::ReportRequest;
    use libc::c_int;
    use nr_common::{SignalNumber, TriggerKind};
    use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
    use std::sync::Weak;
    use std::thread::{self, JoinHandle};

    /// Signal awaiting a report, 0 when none.
    static PENDING: AtomicI32 = AtomicI32::new(0);
    /// Write end of the self-pipe, -1 when unbound.
    static WAKE_FD: AtomicI32 = AtomicI32::new(-1);
    /// Handlers currently between loading `WAKE_FD` and finishing their write.
    static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
    static BOUND: AtomicBool = AtomicBool::new(false);

    #[cfg(any(target_os = "linux", target_os = "android"))]
    unsafe fn errno_location() -> *mut c_int {
        libc::__errno_location()
    }

    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    unsafe fn errno_location() -> *mut c_int {
        libc::__error()
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    )))]
    unsafe fn errno_location() -> *mut c_int {
        std::ptr::null_mut()
    }

    extern "C" fn on_signal(signo: c_int) {
        // Only async-signal-safe work here: atomics and one write(2).
        // A signal that finds one already pending merges with it.
        if PENDING
            .compare_exchange(0, signo, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
        let fd = WAKE_FD.load(Ordering::SeqCst);
        if fd >= 0 {
            wake(fd);
        }
        IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
    }

    fn wake(fd: c_int) {
        unsafe {
            let errno = errno_location();
            let saved = if errno.is_null() { 0 } else { *errno };
            let byte = 1u8;
            libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
            if !errno.is_null() {
                *errno = saved;
            }
        }
    }

    pub(super) struct Binding {
        signal: SignalNumber,
        saved: libc::sigaction,
        write_fd: c_int,
        watchdog: Option<JoinHandle<()>>,
    }

    fn set_flag(fd: c_int, get: c_int, set: c_int, flag: c_int) -> Result<(), HookError> {
        unsafe {
            let current = libc::fcntl(fd, get);
            if current < 0 || libc::fcntl(fd, set, current | flag) < 0 {
                return Err(HookError::last_os_error("fcntl"));
            }
        }
        Ok(())
    }

    fn close_pair(read_fd: c_int, write_fd: c_int) {
        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }

    impl Binding {
        pub(super) fn install(
            signal: SignalNumber,
            dispatcher: Weak<Dispatcher>,
        ) -> Result<Self, HookError> {
            if BOUND
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return Err(HookError::AlreadyBound(signal));
            }
            Self::install_bound(signal, dispatcher).inspect_err(|_| {
                BOUND.store(false, Ordering::SeqCst);
            })
        }

        fn install_bound(
            signal: SignalNumber,
            dispatcher: Weak<Dispatcher>,
        ) -> Result<Self, HookError> {
            let mut fds = [-1 as c_int; 2];
            if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
                return Err(HookError::last_os_error("pipe"));
            }
            let [read_fd, write_fd] = fds;
            let flags = set_flag(write_fd, libc::F_GETFL, libc::F_SETFL, libc::O_NONBLOCK)
                .and_then(|_| set_flag(read_fd, libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC))
                .and_then(|_| set_flag(write_fd, libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC));
            if let Err(err) = flags {
                close_pair(read_fd, write_fd);
                return Err(err);
            }

            PENDING.store(0, Ordering::SeqCst);
            WAKE_FD.store(write_fd, Ordering::SeqCst);

            let watchdog = thread::Builder::new()
                .name("nr-signal-watchdog".to_string())
                .spawn(move || watchdog_loop(read_fd, dispatcher));
            let watchdog = match watchdog {
                Ok(handle) => handle,
                Err(err) => {
                    WAKE_FD.store(-1, Ordering::SeqCst);
                    close_pair(read_fd, write_fd);
                    return Err(HookError::Os {
                        operation: "spawn watchdog",
                        errno: err.raw_os_error().unwrap_or(0),
                        message: err.to_string(),
                    });
                }
            };

            let mut saved: libc::sigaction = unsafe { std::mem::zeroed() };
            let installed = unsafe {
                let mut action: libc::sigaction = std::mem::zeroed();
                action.sa_sigaction = on_signal as extern "C" fn(c_int) as libc::sighandler_t;
                action.sa_flags = libc::SA_RESTART;
                libc::sigemptyset(&mut action.sa_mask);
                libc::sigaction(signal.as_raw(), &action, &mut saved)
            };
            if installed != 0 {
                let err = HookError::last_os_error("sigaction");
                WAKE_FD.store(-1, Ordering::SeqCst);
                // Closing the write end ends the watchdog, which closes the read end.
                unsafe {
                    libc::close(write_fd);
                }
                let _ = watchdog.join();
                return Err(err);
            }

            Ok(Self {
                signal,
                saved,
                write_fd,
                watchdog: Some(watchdog),
            })
        }

        pub(super) fn remove(mut self) -> Result<(), HookError> {
            let restored =
                unsafe { libc::sigaction(self.signal.as_raw(), &self.saved, std::ptr::null_mut()) };
            let result = if restored == 0 {
                Ok(())
            } else {
                Err(HookError::last_os_error("sigaction"))
            };

            // No new handler can see the fd after this store; wait out any
            // that loaded it before closing, so none writes to a reused fd.
            WAKE_FD.store(-1, Ordering::SeqCst);
            while IN_FLIGHT.load(Ordering::SeqCst) != 0 {
                thread::yield_now();
            }
            unsafe {
                libc::close(self.write_fd);
            }
            if let Some(watchdog) = self.watchdog.take() {
                // Removal from inside a signal report must not join itself.
                if watchdog.thread().id() != thread::current().id() {
                    let _ = watchdog.join();
                }
            }
            PENDING.store(0, Ordering::SeqCst);
            BOUND.store(false, Ordering::SeqCst);
            result
        }
    }

    fn watchdog_loop(read_fd: c_int, dispatcher: Weak<Dispatcher>) {
        let mut buf = [0u8; 16];
        loop {
            let n = unsafe { libc::read(read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if n == 0 {
                break;
            }
            if n < 0 {
                if std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                break;
            }

            // Taking the signal before reporting re-arms the handler, so a
            // signal raised during the report wakes us again and queues.
            let signo = PENDING.swap(0, Ordering::SeqCst);
            if signo != 0 {
                if let Some(dispatcher) = dispatcher.upgrade() {
                    let request = ReportRequest::new(
                        TriggerKind::Signal,
                        SignalNumber(signo).to_string(),
                        SIGNAL_LOCATION,
                    );
                    // Failures are logged by the dispatcher.
                    let _ = dispatcher.trigger(request);
                }
            }
        }
        unsafe {
            libc::close(read_fd);
        }
    }
}
