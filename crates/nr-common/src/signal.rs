//! Signal numbers and the signal-name table.
//!
//! Names are accepted case-insensitively with or without the `SIG` prefix
//! (`usr2`, `SIGUSR2`, `SigUsr2`). Numeric strings are accepted as-is.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(unix)]
const SIGNAL_TABLE: &[(&str, i32)] = &[
    ("SIGHUP", libc::SIGHUP),
    ("SIGINT", libc::SIGINT),
    ("SIGQUIT", libc::SIGQUIT),
    ("SIGILL", libc::SIGILL),
    ("SIGTRAP", libc::SIGTRAP),
    ("SIGABRT", libc::SIGABRT),
    ("SIGBUS", libc::SIGBUS),
    ("SIGFPE", libc::SIGFPE),
    ("SIGKILL", libc::SIGKILL),
    ("SIGUSR1", libc::SIGUSR1),
    ("SIGSEGV", libc::SIGSEGV),
    ("SIGUSR2", libc::SIGUSR2),
    ("SIGPIPE", libc::SIGPIPE),
    ("SIGALRM", libc::SIGALRM),
    ("SIGTERM", libc::SIGTERM),
    ("SIGCHLD", libc::SIGCHLD),
    ("SIGCONT", libc::SIGCONT),
    ("SIGSTOP", libc::SIGSTOP),
    ("SIGTSTP", libc::SIGTSTP),
    ("SIGTTIN", libc::SIGTTIN),
    ("SIGTTOU", libc::SIGTTOU),
    ("SIGURG", libc::SIGURG),
    ("SIGXCPU", libc::SIGXCPU),
    ("SIGXFSZ", libc::SIGXFSZ),
    ("SIGVTALRM", libc::SIGVTALRM),
    ("SIGPROF", libc::SIGPROF),
    ("SIGWINCH", libc::SIGWINCH),
    ("SIGSYS", libc::SIGSYS),
];

// The C runtime's signal set on platforms without POSIX signals.
#[cfg(not(unix))]
const SIGNAL_TABLE: &[(&str, i32)] = &[
    ("SIGINT", 2),
    ("SIGILL", 4),
    ("SIGFPE", 8),
    ("SIGSEGV", 11),
    ("SIGTERM", 15),
    ("SIGABRT", 22),
];

/// An OS signal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalNumber(pub i32);

impl SignalNumber {
    #[cfg(unix)]
    pub const SIGUSR2: SignalNumber = SignalNumber(libc::SIGUSR2);
    #[cfg(unix)]
    pub const SIGQUIT: SignalNumber = SignalNumber(libc::SIGQUIT);
    #[cfg(unix)]
    pub const SIGTERM: SignalNumber = SignalNumber(libc::SIGTERM);
    #[cfg(unix)]
    pub const SIGKILL: SignalNumber = SignalNumber(libc::SIGKILL);
    #[cfg(unix)]
    pub const SIGABRT: SignalNumber = SignalNumber(libc::SIGABRT);

    /// Look up a signal by name.
    pub fn from_name(name: &str) -> Option<SignalNumber> {
        let name = name.trim();
        let bare = strip_sig_prefix(name);
        SIGNAL_TABLE
            .iter()
            .find(|(known, _)| known[3..].eq_ignore_ascii_case(bare))
            .map(|&(_, number)| SignalNumber(number))
    }

    /// Canonical `SIGxxx` name, if the number is in the table.
    pub fn name(self) -> Option<&'static str> {
        SIGNAL_TABLE
            .iter()
            .find(|&&(_, number)| number == self.0)
            .map(|&(name, _)| name)
    }

    pub fn as_raw(self) -> i32 {
        self.0
    }

    /// Whether a handler may be installed for this signal.
    pub fn is_catchable(self) -> bool {
        #[cfg(unix)]
        {
            self.0 > 0 && self.0 != libc::SIGKILL && self.0 != libc::SIGSTOP
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    /// Every named signal known on this platform.
    pub fn known() -> impl Iterator<Item = (&'static str, SignalNumber)> {
        SIGNAL_TABLE
            .iter()
            .map(|&(name, number)| (name, SignalNumber(number)))
    }
}

fn strip_sig_prefix(name: &str) -> &str {
    match name.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("SIG") => &name[3..],
        _ => name,
    }
}

impl fmt::Display for SignalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "signal {}", self.0),
        }
    }
}

impl FromStr for SignalNumber {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(number) = s.trim().parse::<i32>() {
            if number > 0 {
                return Ok(SignalNumber(number));
            }
        }
        SignalNumber::from_name(s).ok_or_else(|| ConfigError::InvalidSignal(s.to_string()))
    }
}
