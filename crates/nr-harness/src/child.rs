//! Child process supervision.
//!
//! [`ChildGuard`] owns a spawned scenario child:
//! - stdout and stderr are drained by reader threads into shared buffers
//! - every wait is bounded by a deadline
//! - termination escalates from `SIGTERM` to `SIGKILL` after a grace period
//! - dropping the guard kills and reaps a child that is still running
//!
//! On Linux the child also gets `PR_SET_PDEATHSIG`, so it dies with the
//! harness even if the guard never runs.

use crate::error::HarnessError;
use nr_common::{ProcessId, SignalNumber};
use serde::Serialize;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// How a child ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ExitOutcome {
    /// Exit status 0.
    CleanExit,
    AbnormalExit(i32),
    /// Killed by the named signal.
    SignaledExit(String),
}

impl ExitOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitOutcome::SignaledExit(SignalNumber(signal).to_string());
            }
        }
        match status.code() {
            Some(0) => ExitOutcome::CleanExit,
            Some(code) => ExitOutcome::AbnormalExit(code),
            None => ExitOutcome::AbnormalExit(-1),
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::CleanExit => f.write_str("clean exit"),
            ExitOutcome::AbnormalExit(code) => write!(f, "exit code {code}"),
            ExitOutcome::SignaledExit(signal) => write!(f, "signal {signal}"),
        }
    }
}

type Lines = Arc<Mutex<Vec<String>>>;

fn spawn_reader<R: Read + Send + 'static>(stream: R, sink: Lines) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    sink.lock().unwrap_or_else(PoisonError::into_inner).push(line);
                }
            }
        }
    })
}

/// A running (or finished) scenario child.
pub struct ChildGuard {
    child: Child,
    pid: ProcessId,
    exited: Option<ExitOutcome>,
    stdout: Lines,
    stderr: Lines,
    readers: Vec<JoinHandle<()>>,
}

impl fmt::Debug for ChildGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildGuard")
            .field("pid", &self.pid)
            .field("exited", &self.exited)
            .finish_non_exhaustive()
    }
}

impl ChildGuard {
    /// Spawn `executable` with `args`, extra environment and working directory.
    pub fn spawn(
        executable: &Path,
        args: &[String],
        env: &[(String, String)],
        cwd: Option<&Path>,
    ) -> Result<Self, HarnessError> {
        let mut cmd = Command::new(executable);
        cmd.args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        #[cfg(target_os = "linux")]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: prctl is async-signal-safe and touches no shared state.
            unsafe {
                cmd.pre_exec(|| {
                    if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let mut child = cmd.spawn().map_err(|source| HarnessError::SpawnFailed {
            program: executable.display().to_string(),
            source,
        })?;
        let pid = ProcessId(child.id());
        debug!(pid = %pid, program = %executable.display(), "spawned child");

        let stdout: Lines = Arc::default();
        let stderr: Lines = Arc::default();
        let mut readers = Vec::new();
        if let Some(out) = child.stdout.take() {
            readers.push(spawn_reader(out, Arc::clone(&stdout)));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(spawn_reader(err, Arc::clone(&stderr)));
        }

        Ok(Self {
            child,
            pid,
            exited: None,
            stdout,
            stderr,
            readers,
        })
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Stderr lines captured so far.
    pub fn stderr_lines(&self) -> Vec<String> {
        self.stderr.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stdout lines captured so far.
    pub fn stdout_lines(&self) -> Vec<String> {
        self.stdout.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn stderr_contains(&self, marker: &str) -> bool {
        self.stderr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|line| line.contains(marker))
    }

    /// Poll stderr for `marker` until it appears, the child exits, or
    /// `timeout` passes. Returns whether the marker was seen.
    pub fn wait_for_stderr(&mut self, marker: &str, timeout: Duration, poll: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.stderr_contains(marker) {
                return true;
            }
            if matches!(self.try_wait(), Ok(Some(_)) | Err(_)) {
                // Late lines may still be in the pipe after exit.
                self.join_readers();
                return self.stderr_contains(marker);
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(poll);
        }
    }

    /// Deliver `signal` to the child.
    #[cfg(unix)]
    pub fn send_signal(&self, signal: SignalNumber) -> Result<(), HarnessError> {
        let result = unsafe { libc::kill(self.pid.as_u32() as libc::pid_t, signal.as_raw()) };
        if result == 0 {
            debug!(pid = %self.pid, signal = %signal, "sent signal");
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        let message = match err.raw_os_error() {
            Some(libc::ESRCH) => "process not found".to_string(),
            Some(libc::EPERM) => "permission denied".to_string(),
            Some(libc::EINVAL) => "invalid signal".to_string(),
            _ => err.to_string(),
        };
        Err(HarnessError::Signal {
            pid: self.pid.as_u32(),
            signal,
            message,
        })
    }

    #[cfg(not(unix))]
    pub fn send_signal(&self, signal: SignalNumber) -> Result<(), HarnessError> {
        Err(HarnessError::Signal {
            pid: self.pid.as_u32(),
            signal,
            message: "signals are not supported on this platform".to_string(),
        })
    }

    /// Non-blocking exit check.
    pub fn try_wait(&mut self) -> Result<Option<ExitOutcome>, HarnessError> {
        if let Some(outcome) = &self.exited {
            return Ok(Some(outcome.clone()));
        }
        match self.child.try_wait()? {
            Some(status) => {
                let outcome = ExitOutcome::from_status(status);
                trace!(pid = %self.pid, outcome = %outcome, "child exited");
                self.exited = Some(outcome.clone());
                Ok(Some(outcome))
            }
            None => Ok(None),
        }
    }

    /// Wait up to `timeout` for the child to exit.
    ///
    /// On expiry the child is left running and [`HarnessError::ChildTimeout`]
    /// is returned; dropping the guard kills it.
    pub fn wait_timeout(
        &mut self,
        timeout: Duration,
        poll: Duration,
    ) -> Result<ExitOutcome, HarnessError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(outcome) = self.try_wait()? {
                self.join_readers();
                return Ok(outcome);
            }
            if Instant::now() >= deadline {
                return Err(HarnessError::ChildTimeout {
                    pid: self.pid.as_u32(),
                    timeout,
                });
            }
            thread::sleep(poll);
        }
    }

    /// Stop the child: `SIGTERM`, then `SIGKILL` once `term_grace` passes.
    pub fn terminate(
        &mut self,
        term_grace: Duration,
        poll: Duration,
    ) -> Result<ExitOutcome, HarnessError> {
        if let Some(outcome) = self.try_wait()? {
            self.join_readers();
            return Ok(outcome);
        }

        #[cfg(unix)]
        {
            // A child that exits between the check and the signal is fine.
            let _ = self.send_signal(SignalNumber::SIGTERM);
            match self.wait_timeout(term_grace, poll) {
                Ok(outcome) => return Ok(outcome),
                Err(HarnessError::ChildTimeout { .. }) => {
                    warn!(pid = %self.pid, "child ignored SIGTERM, sending SIGKILL");
                }
                Err(err) => return Err(err),
            }
        }
        #[cfg(not(unix))]
        let _ = (term_grace, poll);

        self.child.kill()?;
        let status = self.child.wait()?;
        let outcome = ExitOutcome::from_status(status);
        self.exited = Some(outcome.clone());
        self.join_readers();
        Ok(outcome)
    }

    fn join_readers(&mut self) {
        for reader in self.readers.drain(..) {
            let _ = reader.join();
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.exited.is_none() && matches!(self.child.try_wait(), Ok(None)) {
            debug!(pid = %self.pid, "killing child on drop");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        // Readers are detached; a grandchild may still hold the pipes open.
    }
}
