//! Trigger kinds and trigger specifications.
//!
//! A trigger specification is a `+`-delimited token string such as
//! `"exception+fatalerror+signal+apicall"`. Parsing is all-or-nothing: one
//! unknown token rejects the whole string. An empty or absent specification
//! means every trigger kind is armed.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Token separator in a trigger specification.
pub const TOKEN_SEPARATOR: char = '+';

/// Category of runtime condition that may cause a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// An exception propagated out of the runtime uncaught.
    UncaughtException,
    /// The runtime reported unrecoverable resource exhaustion.
    FatalResourceExhaustion,
    /// The configured OS signal was delivered.
    Signal,
    /// The host called the explicit report API.
    ApiCall,
}

impl TriggerKind {
    /// Every trigger kind, in canonical order.
    pub const ALL: [TriggerKind; 4] = [
        TriggerKind::UncaughtException,
        TriggerKind::FatalResourceExhaustion,
        TriggerKind::Signal,
        TriggerKind::ApiCall,
    ];

    /// Configuration token for this kind.
    pub fn token(self) -> &'static str {
        match self {
            TriggerKind::UncaughtException => "exception",
            TriggerKind::FatalResourceExhaustion => "fatalerror",
            TriggerKind::Signal => "signal",
            TriggerKind::ApiCall => "apicall",
        }
    }

    /// Look up a kind by token, ignoring ASCII case.
    pub fn from_token(token: &str) -> Option<TriggerKind> {
        TriggerKind::ALL
            .into_iter()
            .find(|kind| kind.token().eq_ignore_ascii_case(token))
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for TriggerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        TriggerKind::from_token(s.trim())
            .ok_or_else(|| ConfigError::InvalidTriggerToken(s.trim().to_string()))
    }
}

/// A set of armed trigger kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerSpec(BTreeSet<TriggerKind>);

impl TriggerSpec {
    /// The empty set: nothing armed.
    pub fn none() -> Self {
        TriggerSpec(BTreeSet::new())
    }

    /// All four kinds armed (the documented default).
    pub fn all() -> Self {
        TriggerKind::ALL.into_iter().collect()
    }

    /// Build a spec from a single kind.
    pub fn only(kind: TriggerKind) -> Self {
        std::iter::once(kind).collect()
    }

    pub fn contains(&self, kind: TriggerKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn insert(&mut self, kind: TriggerKind) -> bool {
        self.0.insert(kind)
    }

    pub fn remove(&mut self, kind: TriggerKind) -> bool {
        self.0.remove(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate kinds in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = TriggerKind> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<TriggerKind> for TriggerSpec {
    fn from_iter<I: IntoIterator<Item = TriggerKind>>(iter: I) -> Self {
        TriggerSpec(iter.into_iter().collect())
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in self.iter() {
            if !first {
                write!(f, "{TOKEN_SEPARATOR}")?;
            }
            f.write_str(kind.token())?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for TriggerSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        parse_trigger_spec(Some(s))
    }
}

/// Parse a `+`-delimited trigger specification.
///
/// `None`, the empty string and whitespace-only strings resolve to every
/// kind. Tokens are trimmed and matched case-insensitively; empty tokens left
/// by stray separators are skipped. The first unknown token fails the whole
/// parse with [`ConfigError::InvalidTriggerToken`].
pub fn parse_trigger_spec(text: Option<&str>) -> Result<TriggerSpec> {
    let text = match text.map(str::trim) {
        None | Some("") => return Ok(TriggerSpec::all()),
        Some(text) => text,
    };

    let mut spec = TriggerSpec::none();
    for token in text.split(TOKEN_SEPARATOR).map(str::trim) {
        if token.is_empty() {
            continue;
        }
        let kind = TriggerKind::from_token(token)
            .ok_or_else(|| ConfigError::InvalidTriggerToken(token.to_string()))?;
        spec.insert(kind);
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_spec() {
        let spec = parse_trigger_spec(Some("exception+fatalerror+signal+apicall")).unwrap();
        assert_eq!(spec, TriggerSpec::all());
    }

    #[test]
    fn empty_and_absent_mean_all() {
        assert_eq!(parse_trigger_spec(None).unwrap(), TriggerSpec::all());
        assert_eq!(parse_trigger_spec(Some("")).unwrap(), TriggerSpec::all());
        assert_eq!(parse_trigger_spec(Some("   ")).unwrap(), TriggerSpec::all());
    }

    #[test]
    fn unknown_token_rejects_whole_spec() {
        let err = parse_trigger_spec(Some("exception+bogus")).unwrap_err();
        assert_eq!(err, ConfigError::InvalidTriggerToken("bogus".to_string()));
    }

    #[test]
    fn tokens_are_trimmed_and_case_insensitive() {
        let spec = parse_trigger_spec(Some(" Signal + APICALL ")).unwrap();
        assert!(spec.contains(TriggerKind::Signal));
        assert!(spec.contains(TriggerKind::ApiCall));
        assert_eq!(spec.len(), 2);
    }

    #[test]
    fn duplicates_collapse() {
        let spec = parse_trigger_spec(Some("signal+signal+signal")).unwrap();
        assert_eq!(spec, TriggerSpec::only(TriggerKind::Signal));
    }

    #[test]
    fn stray_separators_are_ignored() {
        let spec = parse_trigger_spec(Some("+exception++")).unwrap();
        assert_eq!(spec, TriggerSpec::only(TriggerKind::UncaughtException));
    }

    #[test]
    fn separators_only_is_the_empty_set() {
        let spec = parse_trigger_spec(Some("+")).unwrap();
        assert!(spec.is_empty());
    }

    #[test]
    fn display_is_canonical() {
        let spec: TriggerSpec = "apicall+exception".parse().unwrap();
        assert_eq!(spec.to_string(), "exception+apicall");
        assert_eq!(TriggerSpec::all().to_string(), "exception+fatalerror+signal+apicall");
    }

    #[test]
    fn display_round_trips_through_parse() {
        let spec: TriggerSpec = "signal+fatalerror".parse().unwrap();
        let reparsed: TriggerSpec = spec.to_string().parse().unwrap();
        assert_eq!(spec, reparsed);
    }

    #[test]
    fn kind_from_str_reports_token() {
        let err = "nope".parse::<TriggerKind>().unwrap_err();
        assert_eq!(err, ConfigError::InvalidTriggerToken("nope".to_string()));
        assert_eq!("fatalerror".parse::<TriggerKind>().unwrap(), TriggerKind::FatalResourceExhaustion);
    }

    #[test]
    fn serializes_as_kind_list() {
        let spec = TriggerSpec::only(TriggerKind::ApiCall);
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, "[\"api_call\"]");
    }
}
