//! Parsers for individual report options.
//!
//! Each parser validates one raw string value. The startup loader turns
//! their errors into warnings for every option except the trigger
//! specification; the coordinator setters propagate them.

use nr_common::{ConfigError, SignalNumber};

/// Longest accepted fixed report filename.
pub const MAX_FILENAME_LEN: usize = 64;

/// Longest accepted report directory path.
pub const MAX_DIRECTORY_LEN: usize = 1024;

/// Parse a `yes`/`true`/`no`/`false` switch (case-insensitive).
pub fn parse_switch(option: &str, value: &str) -> Result<bool, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::MissingValue {
            option: option.to_string(),
        });
    }
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => Err(ConfigError::InvalidSwitch {
            option: option.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Parse the report trigger signal.
///
/// Only `SIGUSR2` and `SIGQUIT` are accepted here, with optional `SIG`
/// prefix and any case. [`crate::Coordinator::set_signal_number`] accepts
/// any catchable signal.
#[cfg(unix)]
pub fn parse_report_signal(value: &str) -> Result<SignalNumber, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::MissingValue {
            option: "signal".to_string(),
        });
    }
    match SignalNumber::from_name(value) {
        Some(signal) if signal == SignalNumber::SIGUSR2 || signal == SignalNumber::SIGQUIT => {
            Ok(signal)
        }
        _ => Err(ConfigError::InvalidSignal(value.to_string())),
    }
}

#[cfg(not(unix))]
pub fn parse_report_signal(value: &str) -> Result<SignalNumber, ConfigError> {
    Err(ConfigError::InvalidSignal(value.trim().to_string()))
}

/// Signal bound when none is configured.
pub fn default_signal() -> SignalNumber {
    #[cfg(unix)]
    {
        SignalNumber::SIGUSR2
    }
    #[cfg(not(unix))]
    {
        SignalNumber(0)
    }
}

/// Validate a fixed report filename.
pub fn parse_filename(value: &str) -> Result<String, ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::MissingValue {
            option: "filename".to_string(),
        });
    }
    if value.chars().count() > MAX_FILENAME_LEN {
        return Err(ConfigError::ValueTooLong {
            option: "filename".to_string(),
            max: MAX_FILENAME_LEN,
        });
    }
    Ok(value.to_string())
}

/// Validate a generated-filename prefix.
pub fn parse_prefix(value: &str) -> Result<String, ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::MissingValue {
            option: "prefix".to_string(),
        });
    }
    if value.contains(['/', '\\']) {
        return Err(ConfigError::InvalidSwitch {
            option: "prefix".to_string(),
            value: value.to_string(),
        });
    }
    if value.chars().count() > MAX_FILENAME_LEN {
        return Err(ConfigError::ValueTooLong {
            option: "prefix".to_string(),
            max: MAX_FILENAME_LEN,
        });
    }
    Ok(value.to_string())
}

/// Validate a report output directory.
pub fn parse_directory(value: &str) -> Result<String, ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::MissingValue {
            option: "directory".to_string(),
        });
    }
    if value.chars().count() > MAX_DIRECTORY_LEN {
        return Err(ConfigError::ValueTooLong {
            option: "directory".to_string(),
            max: MAX_DIRECTORY_LEN,
        });
    }
    Ok(value.to_string())
}
