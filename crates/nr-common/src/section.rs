//! Report section grammar.
//!
//! A report is a sequence of sections. Each section opens with a title line
//! `==== <Name> ====...` padded with `=` to [`DELIMITER_WIDTH`] columns and is
//! closed by a line of exactly [`DELIMITER_WIDTH`] `=` characters. The
//! renderer also writes that full-width line before the first title, so the
//! closing line of one section doubles as the lead-in of the next.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of the full delimiter line.
pub const DELIMITER_WIDTH: usize = 80;

/// Leader of a section title line.
pub const TITLE_LEADER: &str = "====";

/// The fixed set of sections every report must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SectionName {
    /// Process header: event, pid, versions, command line.
    Header,
    JavaScriptStackTrace,
    JavaScriptHeap,
    SystemInformation,
}

impl SectionName {
    /// Sections in the order the renderer writes them.
    pub const ALL: [SectionName; 4] = [
        SectionName::Header,
        SectionName::JavaScriptStackTrace,
        SectionName::JavaScriptHeap,
        SectionName::SystemInformation,
    ];

    /// Title as it appears between the `====` leaders.
    pub fn title(self) -> &'static str {
        match self {
            SectionName::Header => "NodeReport",
            SectionName::JavaScriptStackTrace => "JavaScript Stack Trace",
            SectionName::JavaScriptHeap => "JavaScript Heap",
            SectionName::SystemInformation => "System Information",
        }
    }

    pub fn from_title(title: &str) -> Option<SectionName> {
        SectionName::ALL
            .into_iter()
            .find(|section| section.title() == title)
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// A line of exactly [`DELIMITER_WIDTH`] `=` characters.
pub fn closing_delimiter() -> String {
    "=".repeat(DELIMITER_WIDTH)
}

/// Title line for a section, padded with `=` to [`DELIMITER_WIDTH`].
///
/// Titles too long to pad still get a single trailing `=` so the line keeps
/// matching `^==== <title> =+$`.
pub fn opening_delimiter(title: &str) -> String {
    let mut line = format!("{TITLE_LEADER} {title} ");
    let pad = DELIMITER_WIDTH.saturating_sub(line.chars().count()).max(1);
    line.extend(std::iter::repeat_n('=', pad));
    line
}

/// Whether `line` is a full-width closing delimiter.
pub fn is_closing_delimiter(line: &str) -> bool {
    line.len() == DELIMITER_WIDTH && line.bytes().all(|b| b == b'=')
}

/// Whether `line` opens the section titled `title`.
pub fn is_opening_delimiter(line: &str, title: &str) -> bool {
    let Some(rest) = line.strip_prefix(TITLE_LEADER) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix(' ') else {
        return false;
    };
    let Some(rest) = rest.strip_prefix(title) else {
        return false;
    };
    let Some(tail) = rest.strip_prefix(' ') else {
        return false;
    };
    !tail.is_empty() && tail.bytes().all(|b| b == b'=')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_line_is_full_width() {
        let line = opening_delimiter("NodeReport");
        assert_eq!(line.len(), DELIMITER_WIDTH);
        assert!(line.starts_with("==== NodeReport ="));
        assert!(is_opening_delimiter(&line, "NodeReport"));
    }

    #[test]
    fn long_titles_keep_a_trailing_pad() {
        let title = "x".repeat(100);
        let line = opening_delimiter(&title);
        assert!(line.ends_with(" ="));
        assert!(is_opening_delimiter(&line, &title));
    }

    #[test]
    fn opening_match_is_exact_on_title() {
        let line = opening_delimiter("JavaScript Heap");
        assert!(is_opening_delimiter(&line, "JavaScript Heap"));
        assert!(!is_opening_delimiter(&line, "JavaScript"));
        assert!(!is_opening_delimiter("==== JavaScript Heap", "JavaScript Heap"));
        assert!(!is_opening_delimiter("==== JavaScript Heap ==x", "JavaScript Heap"));
    }

    #[test]
    fn closing_line_must_be_exactly_full_width() {
        assert!(is_closing_delimiter(&closing_delimiter()));
        assert!(!is_closing_delimiter(&"=".repeat(79)));
        assert!(!is_closing_delimiter(&"=".repeat(81)));
        assert!(!is_closing_delimiter(&opening_delimiter("NodeReport")));
    }

    #[test]
    fn titles_round_trip() {
        for section in SectionName::ALL {
            assert_eq!(SectionName::from_title(section.title()), Some(section));
        }
        assert_eq!(SectionName::from_title("Native Stack"), None);
    }
}
